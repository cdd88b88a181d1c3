//! # Contexto del Servidor
//! src/server/context.rs
//!
//! Un [`Context`] es una instancia corriendo del motor: sockets de
//! escucha, un thread aceptador y `num_threads` workers. `start` devuelve
//! cuando todo está listo para aceptar conexiones; `stop` (o soltar el
//! contexto) bloquea hasta que el último worker terminó.
//!
//! ```text
//! aceptador ──poll(200ms)──► accept ──ACL──► cola(20) ──► worker 1..N
//! ```

use super::access_log::AccessLog;
use super::callbacks::Callbacks;
use super::connection::Accepted;
use super::listener::{bind_all, parse_listening_ports, ListenerSpec, ListeningSocket};
use super::queue::{ConnectionQueue, QUEUE_CAPACITY};
use super::tls::{RustlsProvider, TlsProvider};
use super::worker::{worker_loop, WorkerCount};
use crate::config::Config;
use crate::error::StartError;
use crate::utils::net::{Acl, ThrottleRules};
use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use nix::sys::socket::{setsockopt, sockopt};
use nix::unistd::{setgid, setuid, User};
use std::fs;
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Timeout del poll del aceptador en milisegundos
const POLL_TIMEOUT_MS: i32 = 200;

const RUNNING: u8 = 0;
const STOPPING: u8 = 1;
const STOPPED: u8 = 2;

/// Estado compartido entre el aceptador y los workers
pub(crate) struct Shared {
    pub config: Config,
    pub callbacks: Arc<dyn Callbacks>,
    pub tls: Option<Arc<dyn TlsProvider>>,
    pub acl: Acl,
    pub throttle: ThrottleRules,
    pub access_log: Option<AccessLog>,
    pub queue: ConnectionQueue<Accepted>,
    pub workers: WorkerCount,
    /// Puerto del primer listener TLS, destino de los redirects
    pub tls_port: Option<u16>,
    state: AtomicU8,
}

impl Shared {
    pub fn is_stopping(&self) -> bool {
        self.state.load(Ordering::SeqCst) != RUNNING
    }

    fn set_state(&self, state: u8) {
        self.state.store(state, Ordering::SeqCst);
    }
}

/// Instancia del servidor en ejecución
pub struct Context {
    shared: Arc<Shared>,
    listening: Vec<ListenerSpec>,
    master: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl Context {
    /// Valida la configuración, abre los sockets y arranca los threads.
    ///
    /// # Errores
    ///
    /// Cualquier opción inválida, un puerto que no se puede abrir, un
    /// certificado ilegible o un `run_as_user` inaplicable. En ese caso
    /// no queda nada corriendo.
    pub fn start(config: Config, callbacks: Arc<dyn Callbacks>) -> Result<Context, StartError> {
        let result = Self::try_start(config, callbacks);
        if let Err(err) = &result {
            error!("No se pudo iniciar el servidor: {}", err);
        }
        result
    }

    fn try_start(config: Config, callbacks: Arc<dyn Callbacks>) -> Result<Context, StartError> {
        config.validate().map_err(StartError::Config)?;

        let acl = match &config.access_control_list {
            Some(list) => Acl::parse(list).map_err(StartError::Config)?,
            None => Acl::default(),
        };
        let throttle = match &config.throttle {
            Some(spec) => ThrottleRules::parse(spec).map_err(StartError::Config)?,
            None => ThrottleRules::default(),
        };

        if let Some(path) = &config.global_auth_file {
            let is_file = fs::metadata(path).map(|m| m.is_file()).unwrap_or(false);
            if !is_file {
                return Err(StartError::AuthFile(path.clone()));
            }
        }

        let tls = match callbacks.init_tls(&config) {
            Some(provider) => Some(provider),
            None => match &config.ssl_certificate {
                Some(path) => Some(Arc::new(RustlsProvider::from_pem_file(path)?) as Arc<dyn TlsProvider>),
                None => None,
            },
        };

        let specs = parse_listening_ports(&config.listening_ports)?;
        let sockets = bind_all(&specs, tls.is_some())?;

        if let Some(user) = &config.run_as_user {
            switch_user(user)?;
        }

        let listening: Vec<ListenerSpec> = sockets.iter().map(ListeningSocket::spec).collect();
        let tls_port = listening.iter().find(|spec| spec.is_tls).map(|spec| spec.addr.port());
        let access_log = config.access_log_file.as_ref().map(AccessLog::new);
        let num_threads = config.num_threads;

        let shared = Arc::new(Shared {
            config,
            callbacks,
            tls,
            acl,
            throttle,
            access_log,
            queue: ConnectionQueue::new(QUEUE_CAPACITY),
            workers: WorkerCount::new(),
            tls_port,
            state: AtomicU8::new(RUNNING),
        });

        let mut ctx = Context {
            shared: Arc::clone(&shared),
            listening,
            master: None,
            workers: Vec::with_capacity(num_threads),
        };

        // Si algo falla a partir de aquí, soltar `ctx` detiene lo creado
        let master = thread::Builder::new()
            .name("httpd-master".to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                move || master_loop(shared, sockets)
            })
            .map_err(StartError::Io)?;
        ctx.master = Some(master);

        for i in 0..num_threads {
            shared.workers.register();
            let spawned = thread::Builder::new().name(format!("httpd-worker-{}", i)).spawn({
                let shared = Arc::clone(&shared);
                move || worker_loop(shared)
            });
            match spawned {
                Ok(handle) => ctx.workers.push(handle),
                Err(err) => {
                    shared.workers.exited();
                    return Err(StartError::Io(err));
                }
            }
        }

        info!(
            "Servidor iniciado con {} workers en {}",
            num_threads,
            ctx.listening
                .iter()
                .map(|spec| spec.addr.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(ctx)
    }

    /// Direcciones reales de los listeners, en el orden de `listening_ports`
    pub fn listening_addrs(&self) -> Vec<SocketAddr> {
        self.listening.iter().map(|spec| spec.addr).collect()
    }

    pub fn listeners(&self) -> &[ListenerSpec] {
        &self.listening
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn is_running(&self) -> bool {
        !self.shared.is_stopping()
    }

    /// Detiene el servidor y espera a que terminen todos los threads
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let master = match self.master.take() {
            Some(master) => master,
            None => return,
        };
        info!("Deteniendo servidor...");
        self.shared.set_state(STOPPING);

        if master.join().is_err() {
            // El aceptador no llegó a vaciar la cola
            drop(self.shared.queue.shutdown());
            self.shared.workers.wait_all();
            self.shared.set_state(STOPPED);
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        info!("Servidor detenido");
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn switch_user(name: &str) -> Result<(), StartError> {
    let user = User::from_name(name)
        .map_err(|err| StartError::RunAsUser(format!("{}: {}", name, err)))?
        .ok_or_else(|| StartError::RunAsUser(format!("unknown user {}", name)))?;

    setgid(user.gid).map_err(|err| StartError::RunAsUser(format!("setgid({}): {}", name, err)))?;
    setuid(user.uid).map_err(|err| StartError::RunAsUser(format!("setuid({}): {}", name, err)))?;
    info!("Ejecutando como {}", name);
    Ok(())
}

fn master_loop(shared: Arc<Shared>, sockets: Vec<ListeningSocket>) {
    let mut fds: Vec<PollFd> = sockets
        .iter()
        .map(|socket| PollFd::new(socket.as_raw_fd(), PollFlags::POLLIN))
        .collect();

    while !shared.is_stopping() {
        match poll(&mut fds, POLL_TIMEOUT_MS) {
            Ok(0) => {}
            Ok(_) => {
                for (fd, socket) in fds.iter().zip(&sockets) {
                    let ready = fd.revents().map_or(false, |r| r.contains(PollFlags::POLLIN));
                    if ready {
                        accept_new_connection(&shared, socket);
                    }
                }
            }
            Err(Errno::EINTR) => {}
            Err(err) => {
                error!("poll: {}", err);
                thread::sleep(Duration::from_millis(POLL_TIMEOUT_MS as u64));
            }
        }
    }
    debug!("Aceptador detenido");

    drop(fds);
    drop(sockets);

    // Conexiones aceptadas que ningún worker tomó: se cierran
    drop(shared.queue.shutdown());
    shared.workers.wait_all();
    shared.set_state(STOPPED);
}

fn accept_new_connection(shared: &Shared, socket: &ListeningSocket) {
    let (stream, remote) = match socket.listener().accept() {
        Ok(accepted) => accepted,
        Err(err) => {
            debug!("accept: {}", err);
            return;
        }
    };

    if !shared.acl.allows(remote.ip()) {
        warn!("{} is not allowed to connect", remote.ip());
        return;
    }

    let spec = socket.spec();
    let timeout = Some(Duration::from_millis(shared.config.request_timeout_ms));
    let configured = stream
        .set_nonblocking(false)
        .and_then(|_| stream.set_read_timeout(timeout))
        .and_then(|_| stream.set_write_timeout(timeout));
    if let Err(err) = configured {
        warn!("No se pudo configurar el socket de {}: {}", remote, err);
        return;
    }
    if let Err(err) = setsockopt(stream.as_raw_fd(), sockopt::KeepAlive, &true) {
        debug!("SO_KEEPALIVE: {}", err);
    }

    let local = stream.local_addr().unwrap_or(spec.addr);
    let accepted = Accepted {
        stream,
        remote,
        local,
        is_tls: spec.is_tls,
        tls_redirect: spec.tls_redirect,
    };
    if shared.queue.push(accepted).is_err() {
        debug!("Servidor deteniéndose, conexión de {} descartada", remote);
    }
}
