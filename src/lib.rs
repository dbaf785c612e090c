pub mod balance;
pub mod config;
pub mod motor;
pub mod odometry;
pub mod runtime;
