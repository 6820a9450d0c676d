//! WebSocket Dashboard Channel
//!
//! The browser dashboard talks to the server over one WebSocket per page.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: Tracks open pages and the user each is logged in as
//! - **Handler**: Handles the upgrade and drives the page's session gate
//! - **Messages**: Defines client commands and server render events
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:8086/ws');
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({type: 'login', token: idToken}));
//! };
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'point_added') chart(msg.target).addPoint([msg.x, msg.y], true, msg.shift);
//! };
//! ```

mod handler;
mod hub;
mod messages;

pub use handler::websocket_handler;
pub use hub::{ConnectionHub, ConnectionId, HubConfig, HubError};
pub use messages::{ClientMessage, ServerMessage};
