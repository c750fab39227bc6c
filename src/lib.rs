//! Session lifecycle and news aggregation backend for the wealthdesk
//! back office.

pub mod config;
pub mod error;
pub mod state;
pub mod db;
pub mod routes;

pub mod crypto {
    pub mod token;
}

pub mod models {
    pub mod session;
    pub mod news;
}

pub mod repositories {
    pub mod session;
    pub mod memory;
    pub mod keywords;
}

pub mod services {
    pub mod sessions;
    pub mod identity;
    pub mod search;
    pub mod news;
}

pub mod handlers {
    pub mod json;
    pub mod sessions;
    pub mod news;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
}

pub mod validation {
    pub mod session;
}
