//! Client side of the exam portal: the REST client with gateway fallback and
//! token refresh, the real-time chat client, the local store and the screen
//! controllers built on top of them.

pub mod api;
pub mod app;
pub mod chat;
pub mod devtools;
pub mod pages;
pub mod storage;
pub mod utils;
