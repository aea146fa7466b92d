// Library root
// -----------
// The binary (`main.rs`) wires these modules into the interactive
// reassignment tool.
//
// Module responsibilities:
// - `config`: environment settings, signing key loading and the
//   display-name -> server-id mapping.
// - `token`: ES256 client assertions for the ASM API.
// - `api`: blocking HTTP calls (device search, server list, assignment).
// - `ui`: the terminal flow that sequences the above.
// - `error`: the crate-wide error type.
pub mod api;
pub mod config;
pub mod error;
pub mod token;
pub mod ui;
