// Core services
pub mod orders;
pub mod products;
pub mod users;

// Bulk catalog import
pub mod imports;
