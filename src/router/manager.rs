//! Session manager
//!
//! Registry of concurrently running sessions for drivers that hold more than
//! one. Each entry is the controller of an independent worker; sessions share
//! nothing but the transport.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use super::dispatcher::{spawn_session_worker, DispatcherOptions, SessionController};
use super::relay::EventStream;
use crate::session::Session;
use crate::ssh::Transport;

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    options: DispatcherOptions,
    sessions: DashMap<String, SessionController>,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn Transport>, options: DispatcherOptions) -> Self {
        Self {
            transport,
            options,
            sessions: DashMap::new(),
        }
    }

    /// Start a new, disconnected session
    pub fn open(&self) -> (String, SessionController, EventStream) {
        let session_id = Uuid::new_v4().to_string();
        let session = Session::new(self.transport.clone());
        let (controller, stream) =
            spawn_session_worker(session, session_id.clone(), self.options.clone());

        self.sessions.insert(session_id.clone(), controller.clone());
        info!("Opened session {} ({} active)", session_id, self.sessions.len());
        (session_id, controller, stream)
    }

    pub fn get(&self, session_id: &str) -> Option<SessionController> {
        self.sessions.get(session_id).map(|c| c.value().clone())
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Disconnect a session and stop its worker; returns false for unknown ids
    pub async fn close(&self, session_id: &str) -> bool {
        let Some((_, controller)) = self.sessions.remove(session_id) else {
            return false;
        };

        match controller.disconnect() {
            Ok(ticket) => {
                if let Err(e) = ticket.await {
                    warn!("Disconnect of {} failed: {}", session_id, e);
                }
            }
            // Already disconnecting or stopped; shutdown still applies
            Err(e) => info!("Closing {}: {}", session_id, e),
        }
        controller.shutdown().await;

        info!("Closed session {}", session_id);
        true
    }

    pub async fn close_all(&self) {
        for session_id in self.ids() {
            self.close(&session_id).await;
        }
    }
}
