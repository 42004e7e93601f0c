pub mod clock;
pub mod enrollment_session;
