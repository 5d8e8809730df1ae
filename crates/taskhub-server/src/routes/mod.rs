pub mod auth_sync;
pub mod cron;
pub mod events;
pub mod files;
pub mod health;
pub mod rpc;
