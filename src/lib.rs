#![forbid(unsafe_code)]

//! Campus feed engine: section state for a university-association
//! announcement feed.
//!
//! The engine owns one store per screen, composes the visible sections
//! (missed digest, association strip, announcement feed, bookmarks) and
//! publishes render updates as data arrives. Three flows drive it:
//! 1. **Loading**: independent fetches per section, tolerant of failures
//! 2. **Association selection**: single selection with stale-result discard
//! 3. **Unread traversal**: acknowledge-and-advance through unread items
//!
//! # Library usage
//!
//! ```rust,no_run
//! use campus_feed::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use campus_feed::core::config::Config;
//! use campus_feed::feed::compose::{ComposePolicy, compose};
//! ```

pub mod prelude;

pub mod core;
pub mod feed;
pub mod logger;
