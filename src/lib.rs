pub mod app_state;
pub mod csvio;
pub mod db;
pub mod genai;
pub mod handlers;
pub mod model;
pub mod ratelimit;
pub mod rules;
pub mod sms;
pub mod statement;
pub mod sync;
