pub mod attendance;
pub mod lesson;
pub mod session;
