//! HTTP request handlers shared by every Boxoffice service.

pub mod health;

pub use health::health_check;
