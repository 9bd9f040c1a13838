pub mod backup_exchange;
pub mod classes;
pub mod core;
pub mod internships;
pub mod students;
pub mod teachers;
