pub mod employees;
pub mod feedback;
pub mod health;
pub mod matches;
pub mod projects;
