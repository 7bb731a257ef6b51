#![forbid(unsafe_code)]

//! Shared library behind the `sachgeschichten` and `tatort` downloaders.

pub mod azlist;
pub mod config;
pub mod episode;
pub mod error;
pub mod fallback;
pub mod http;
pub mod index;
pub mod jsonld;
pub mod mediathekview;
pub mod prompt;
pub mod repository;
pub mod sachgeschichten;
pub mod slug;
pub mod tatort;
pub mod thumbnail;
pub mod tools;
