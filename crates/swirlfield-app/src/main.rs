use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use swirlfield_app::{AppState, Broadcaster, SharedField, router};
use swirlfield_core::{FieldConfig, Solver};
use tracing::info;

/// Startup parameters. All simulation coefficients are fixed for the process
/// lifetime; there is no runtime mutation surface.
#[derive(Debug, Parser)]
#[command(name = "swirlfield", about = "Tiled scalar-field simulation with live snapshot streaming")]
struct Args {
    /// Grid width in cells.
    #[arg(long, default_value_t = 64)]
    width: u32,
    /// Grid height in cells.
    #[arg(long, default_value_t = 64)]
    height: u32,
    /// Tile columns for parallel stepping.
    #[arg(long, default_value_t = 4)]
    tiles_x: u32,
    /// Tile rows for parallel stepping.
    #[arg(long, default_value_t = 4)]
    tiles_y: u32,
    /// Simulation timestep.
    #[arg(long, default_value_t = 0.05)]
    dt: f64,
    /// Amplitude of per-cell noise injection.
    #[arg(long, default_value_t = 0.02)]
    noise_amplitude: f64,
    /// Semi-Lagrangian backward-sample scale.
    #[arg(long, default_value_t = 0.6)]
    advection_scale: f64,
    /// Diffusion coefficient.
    #[arg(long, default_value_t = 0.08)]
    diffusion: f64,
    /// Entropy relaxation rate.
    #[arg(long, default_value_t = 0.03)]
    entropy_coupling: f64,
    /// Seed for the noise source; omit to seed from entropy.
    #[arg(long)]
    seed: Option<u64>,
    /// Milliseconds between simulation steps.
    #[arg(long, default_value_t = 50)]
    sim_interval_ms: u64,
    /// Milliseconds between snapshot broadcasts.
    #[arg(long, default_value_t = 100)]
    broadcast_interval_ms: u64,
    /// Address to serve HTTP and WebSocket traffic on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,
    /// Directory of static viewer assets.
    #[arg(long, default_value = "static")]
    static_dir: PathBuf,
}

impl Args {
    fn field_config(&self) -> FieldConfig {
        FieldConfig {
            width: self.width,
            height: self.height,
            tiles_x: self.tiles_x,
            tiles_y: self.tiles_y,
            dt: self.dt,
            noise_amplitude: self.noise_amplitude,
            advection_scale: self.advection_scale,
            diffusion: self.diffusion,
            entropy_coupling: self.entropy_coupling,
            rng_seed: self.seed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let solver = Solver::new(args.field_config()).context("invalid simulation parameters")?;
    info!(
        width = args.width,
        height = args.height,
        tiles = solver.tiles().len(),
        "starting swirlfield simulation"
    );

    let field: SharedField = Arc::new(RwLock::new(solver.state().clone()));

    let sim_field = Arc::clone(&field);
    let sim_period = Duration::from_millis(args.sim_interval_ms.max(1));
    thread::spawn(move || run_sim_loop(solver, sim_field, sim_period));

    let broadcaster = Arc::new(Broadcaster::new());
    let broadcast_period = Duration::from_millis(args.broadcast_interval_ms.max(1));
    tokio::spawn(Arc::clone(&broadcaster).run(Arc::clone(&field), broadcast_period));

    let app = router(AppState { field, broadcaster }, &args.static_dir);
    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!(address = %args.listen, "swirlfield server listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Fixed-cadence simulation loop: step the solver, then publish the new
/// generation through the accessor. The heavy kernel runs on solver-owned
/// buffers, so the write lock is held only for the swap.
fn run_sim_loop(mut solver: Solver, field: SharedField, period: Duration) {
    loop {
        thread::sleep(period);
        solver.step();
        let snapshot = solver.state().clone();
        *field.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}
