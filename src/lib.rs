// Alliance dashboard overlay for the browser game client

pub mod core;

#[cfg(not(target_arch = "wasm32"))]
pub mod logging;

#[cfg(target_arch = "wasm32")]
mod web;
