//! # httpd_engine - Entry Point
//! src/main.rs
//!
//! Servidor standalone: toma la configuración de la línea de comandos (o
//! de variables `HTTPD_*`), arranca un contexto sin callbacks y espera
//! SIGINT/SIGTERM para detenerlo.

use httpd_engine::config::Config;
use httpd_engine::logging::Logger;
use httpd_engine::server::{Context, NoCallbacks};
use log::{error, info};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
    let config = Config::new();

    if let Err(err) = Logger::init(&config) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }

    if let Err(err) = config.validate() {
        error!("Configuración inválida: {}", err);
        process::exit(1);
    }
    config.print_summary();

    // Cualquiera de las dos señales marca el pedido de detención
    let stop_requested = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        if let Err(err) = signal_hook::flag::register(signal, Arc::clone(&stop_requested)) {
            error!("No se pudo instalar el handler de la señal {}: {}", signal, err);
            process::exit(1);
        }
    }

    let ctx = match Context::start(config, Arc::new(NoCallbacks)) {
        Ok(ctx) => ctx,
        // `start` ya registró el motivo
        Err(_) => process::exit(1),
    };

    for addr in ctx.listening_addrs() {
        info!("Escuchando en http://{}", addr);
    }

    while !stop_requested.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
    }

    info!("Señal recibida, deteniendo el servidor...");
    ctx.stop();
    info!("Servidor detenido");
}
