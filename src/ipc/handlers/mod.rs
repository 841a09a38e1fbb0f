pub mod core;
pub mod import;
pub mod lessons;
pub mod session;
pub mod students;
pub mod submissions;
