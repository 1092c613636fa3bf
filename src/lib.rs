//! # widgetboard
//!
//! Client-side core of a personal-finance dashboard. A user's board is a
//! stack of rows; each row holds a fixed number of widgets set by its row
//! type, and each widget is either a placeholder or bound to a display
//! kind over one of the user's linked accounts.
//!
//! The [`store::BoardStore`] owns the loaded board and applies confirmed
//! mutations through a pure reducer. The [`binder`] module drives the
//! bind and unbind flows for a single widget. Persistence sits behind the
//! ports in [`remote`], with an HTTP adapter for the real server and an
//! in-memory one for tests and the CLI demo.

pub mod binder;
pub mod compat;
pub mod config;
pub mod error;
pub mod layout;
pub mod model;
pub mod remote;
pub mod store;
