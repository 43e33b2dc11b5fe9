//! Route dispatch
//!
//! Resolves the four public route names to [`ItemService`](crate::service::ItemService)
//! handlers and checks that each request uses the interaction model its
//! route expects.
//!
//! | Route                       | Interaction      |
//! |-----------------------------|------------------|
//! | `newItems.request-response` | request-response |
//! | `newItems.fire-and-forget`  | fire-and-forget  |
//! | `newItems.request-stream`   | request-stream   |
//! | `newItems.monitor`          | request-stream   |

pub mod dispatch;
pub mod error;
pub mod route;

pub use dispatch::{Reply, ReplyStream, Router};
pub use error::DispatchError;
pub use route::Route;
