pub mod intake;
pub mod lifecycle;
pub mod route;
pub mod simulator;
