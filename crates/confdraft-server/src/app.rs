// Application task: owns the draft engine and answers every request frame.
//
// All requests from all connections arrive on one channel and are handled
// here one at a time, so this process is the single writer of its database.

use confdraft_core::config::ServerConfig;
use confdraft_core::draft::DraftEngine;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::protocol::{self, Action, ProtocolError, Reply, Request};
use crate::ws_server::WsEvent;

pub struct AppState {
    pub engine: DraftEngine,
    pub server: ServerConfig,
}

fn to_data<T: Serialize>(value: T) -> Result<serde_json::Value, ProtocolError> {
    serde_json::to_value(value).map_err(ProtocolError::Encode)
}

impl AppState {
    pub fn new(engine: DraftEngine, server: ServerConfig) -> Self {
        AppState { engine, server }
    }

    /// Parse, authorize and execute one request frame.
    pub fn handle_request(&self, text: &str) -> Reply {
        let request = match protocol::parse_request(text) {
            Ok(request) => request,
            Err((id, err)) => {
                debug!("Rejecting malformed request: {err}");
                return Reply::error(id, &err);
            }
        };

        let id = Some(request.id.clone());
        match self.dispatch(&request) {
            Ok(data) => Reply::ok(id, data),
            Err(err) => {
                if err.is_fatal() {
                    error!(request_id = %request.id, code = err.code(), "Request failed: {err}");
                }
                Reply::error(id, &err)
            }
        }
    }

    fn dispatch(&self, request: &Request) -> Result<serde_json::Value, ProtocolError> {
        let Request {
            scope,
            user,
            action,
            ..
        } = request;
        let (scope, user) = (*scope, *user);

        if action.is_admin_only() && !self.server.is_admin(user) {
            warn!(scope, user, "Non-admin attempted {action:?}");
            return Err(ProtocolError::Forbidden { user });
        }

        let engine = &self.engine;
        match action {
            Action::StartDraft { roster, channel } => {
                to_data(engine.start_draft(scope, *channel, roster)?)
            }
            Action::EndDraft => to_data(engine.end_draft(scope)?),
            Action::Claim { resource } => to_data(engine.claim(scope, user, resource)?),
            Action::ChooseGroup { group } => to_data(engine.choose_group(scope, user, group)?),
            Action::Pick { resource } => to_data(engine.pick(scope, user, resource)?),
            Action::ListAvailable => to_data(engine.available_resources(scope)?),
            Action::Status => to_data(engine.status(scope)?),
            Action::GroupRosters => to_data(engine.group_rosters(scope)?),
            Action::GroupView { group } => to_data(engine.group_view(scope, group)?),
            Action::ListGroups => to_data(engine.group_slots(scope)?),
            Action::Lookup { resource } => to_data(engine.lookup(scope, resource)?),
        }
    }
}

/// Run the application loop until the WebSocket channel closes.
pub async fn run(mut ws_rx: mpsc::Receiver<WsEvent>, state: AppState) -> anyhow::Result<()> {
    info!("Application event loop started");

    while let Some(event) = ws_rx.recv().await {
        match event {
            WsEvent::Connected { addr } => info!("Client connected from {addr}"),
            WsEvent::Disconnected { addr } => info!("Client {addr} disconnected"),
            WsEvent::Message { addr, text, reply } => {
                let response = state.handle_request(&text);
                let frame = serde_json::to_string(&response)?;
                if reply.send(frame).is_err() {
                    debug!("Client {addr} went away before its reply was sent");
                }
            }
        }
    }

    info!("WebSocket channel closed, shutting down");
    Ok(())
}
