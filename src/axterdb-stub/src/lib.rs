//! axterdb-stub - an in-memory stand-in for an AxterDB instance
//!
//! Serves the same endpoints and JSON envelopes as a real instance, backed by
//! [`StubState`]. The client's integration tests run it on an ephemeral port:
//!
//! ```rust,no_run
//! use axterdb_stub::{KeyRecord, StubServer, StubState};
//!
//! # async fn demo() -> std::io::Result<()> {
//! let state = StubState::new().with_key(
//!     "key",
//!     KeyRecord { name: "dev".into(), admin: true, databases: vec!["main".into()] },
//! );
//! let server = StubServer::spawn(state)?;
//! println!("instance at {}", server.host());
//! server.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod state;

pub use config::{KeySeed, StubConfig};
pub use error::StubError;
pub use state::{KeyRecord, StubState};

use actix_web::dev::{Server, ServerHandle};
use actix_web::{web, App, HttpServer};
use std::net::{SocketAddr, TcpListener};
use tracing_actix_web::TracingLogger;

/// Build the stub server on an already bound listener
pub fn run(listener: TcpListener, state: web::Data<StubState>) -> std::io::Result<Server> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(TracingLogger::default())
            .configure(api::configure)
    })
    .workers(1)
    .listen(listener)?
    .run();

    Ok(server)
}

/// A stub instance running in the background on `127.0.0.1`
pub struct StubServer {
    addr: SocketAddr,
    state: web::Data<StubState>,
    handle: ServerHandle,
}

impl StubServer {
    /// Bind an ephemeral port and serve `state` on the current tokio runtime
    pub fn spawn(state: StubState) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let state = web::Data::new(state);

        let server = run(listener, state.clone())?;
        let handle = server.handle();
        tokio::spawn(server);

        tracing::debug!(%addr, "Stub instance started");
        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    /// Address in the `ip:port` form the client expects
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn state(&self) -> &StubState {
        &self.state
    }

    pub async fn stop(self) {
        self.handle.stop(false).await;
    }
}
