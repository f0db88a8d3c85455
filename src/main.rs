//! session-mux binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use session_mux::api::{self, register_introspection};
use session_mux::cli;
use session_mux::config::{BackendKind, Config};
use session_mux::session::{
    MemoryBackend, RequestScopedBackend, Session, SessionBackend, SessionEvent, SessionEventFn,
};
use session_mux::{logging, Dispatcher};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'session-mux --help' for more information.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init_with_filter(config.log_filter()) {
        eprintln!("warning: failed to initialize logging: {}", e);
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let server_config = config.to_server_config()?;

    let mut memory = None;
    let backend: Arc<dyn SessionBackend> = match config.session.backend {
        BackendKind::Memory => {
            let backend = Arc::new(MemoryBackend::new(config.to_memory_config()?));
            backend.set_event_sink(Arc::new(SessionEventFn::new(
                |event: SessionEvent, session: &Session| {
                    debug!(%event, session = %session.id(), "session event");
                },
            )));
            backend.start_reaper();
            memory = Some(backend.clone());
            backend as Arc<dyn SessionBackend>
        }
        BackendKind::Request => Arc::new(RequestScopedBackend::new()),
    };

    let mut mux = Dispatcher::from_config(config.to_dispatch_config(), backend);
    let monitor = config.dispatch.monitor.then(|| mux.start_monitor());
    if config.dispatch.introspection {
        register_introspection(&mut mux, monitor, memory.clone())?;
    }

    info!("session-mux v{}", env!("CARGO_PKG_VERSION"));
    info!(
        backend = ?config.session.backend,
        prefix = %config.server.prefix,
        routes = mux.routes().len(),
        "Dispatcher ready"
    );

    let result = api::serve(server_config, Arc::new(mux)).await;

    if let Some(memory) = memory {
        memory.stop_reaper();
    }
    result?;
    Ok(())
}
