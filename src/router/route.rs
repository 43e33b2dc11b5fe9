//! Route names
//!
//! Route strings are part of the external contract and must match byte for
//! byte.

use std::str::FromStr;

use super::error::DispatchError;
use crate::protocol::InteractionModel;

pub const ROUTE_REQUEST_RESPONSE: &str = "newItems.request-response";
pub const ROUTE_REQUEST_STREAM: &str = "newItems.request-stream";
pub const ROUTE_FIRE_AND_FORGET: &str = "newItems.fire-and-forget";
pub const ROUTE_MONITOR: &str = "newItems.monitor";

/// A named operation exposed at the system boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Save one item, reply with the saved item
    RequestResponse,
    /// Reply with every stored item
    RequestStream,
    /// Save one item, no reply
    FireAndForget,
    /// Reply with the live feed
    Monitor,
}

impl Route {
    pub const ALL: [Route; 4] = [
        Route::RequestResponse,
        Route::RequestStream,
        Route::FireAndForget,
        Route::Monitor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Route::RequestResponse => ROUTE_REQUEST_RESPONSE,
            Route::RequestStream => ROUTE_REQUEST_STREAM,
            Route::FireAndForget => ROUTE_FIRE_AND_FORGET,
            Route::Monitor => ROUTE_MONITOR,
        }
    }

    /// Interaction model a request to this route must use
    pub fn interaction(self) -> InteractionModel {
        match self {
            Route::RequestResponse => InteractionModel::RequestResponse,
            Route::FireAndForget => InteractionModel::FireAndForget,
            Route::RequestStream | Route::Monitor => InteractionModel::RequestStream,
        }
    }
}

impl FromStr for Route {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Route::ALL
            .into_iter()
            .find(|route| route.as_str() == s)
            .ok_or_else(|| DispatchError::UnknownRoute(s.to_string()))
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
