//! Core simulation for a 2-D scalar field: a potential `phi`, the induced
//! rotational velocity `(vx, vy)`, and an entropy-like scalar `s` relaxing
//! toward 1. The grid is partitioned into rectangular tiles and advanced one
//! timestep at a time by a rayon-parallel kernel that reads a frozen copy of
//! the previous generation, so the result is independent of tile scheduling.

use rand::{Rng, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when constructing a solver.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// One grid cell: position, potential, induced velocity, entropy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldSample {
    pub x: u32,
    pub y: u32,
    pub phi: f64,
    pub vx: f64,
    pub vy: f64,
    pub s: f64,
}

impl FieldSample {
    fn at(x: u32, y: u32) -> Self {
        Self {
            x,
            y,
            phi: 0.0,
            vx: 0.0,
            vy: 0.0,
            s: 0.0,
        }
    }
}

/// The authoritative grid-wide state at one point in simulated time.
///
/// Invariant: `samples` holds exactly `width * height` entries in row-major
/// order, so `samples[y * width + x]` is always the cell at `(x, y)`. Every
/// producer preserves this; the solver and snapshot serialization rely on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldState {
    pub width: u32,
    pub height: u32,
    pub samples: Vec<FieldSample>,
}

impl FieldState {
    /// Creates a zeroed field, filling every cell exactly once in row-major order.
    pub fn new(width: u32, height: u32) -> Self {
        let mut samples = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                samples.push(FieldSample::at(x, y));
            }
        }
        Self {
            width,
            height,
            samples,
        }
    }

    /// Row-major index of the cell at `(x, y)`.
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// The sample at `(x, y)`.
    pub fn sample(&self, x: u32, y: u32) -> &FieldSample {
        &self.samples[self.index(x, y)]
    }
}

/// A half-open rectangle `[x0, x1) x [y0, y1)` over grid coordinates, the
/// unit of parallel work. Trailing tiles of an uneven partition may be empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Tile {
    /// Whether the tile covers no cells.
    pub fn is_empty(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }

    /// Number of cells covered.
    pub fn cell_count(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.x1 - self.x0) as usize * (self.y1 - self.y0) as usize
        }
    }
}

/// Splits a `width x height` grid into `tiles_x * tiles_y` non-overlapping
/// rectangles emitted in row-major `(ty, tx)` order.
///
/// Tile counts are clamped to a minimum of 1. Step sizes are the ceiling
/// division of each dimension, so when a dimension does not divide evenly the
/// trailing tiles shrink, and tiles past the edge come out empty. The union of
/// all tiles is always exactly the grid, with no overlaps.
pub fn partition(width: u32, height: u32, tiles_x: u32, tiles_y: u32) -> Vec<Tile> {
    let tiles_x = tiles_x.max(1);
    let tiles_y = tiles_y.max(1);
    let w_step = width.div_ceil(tiles_x);
    let h_step = height.div_ceil(tiles_y);
    let mut tiles = Vec::with_capacity(tiles_x as usize * tiles_y as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            tiles.push(Tile {
                x0: tx * w_step,
                y0: ty * h_step,
                x1: ((tx + 1) * w_step).min(width),
                y1: ((ty + 1) * h_step).min(height),
            });
        }
    }
    tiles
}

/// Static configuration for a field simulation, immutable once the solver is
/// constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Grid width in cells.
    pub width: u32,
    /// Grid height in cells.
    pub height: u32,
    /// Number of tile columns (clamped to at least 1).
    pub tiles_x: u32,
    /// Number of tile rows (clamped to at least 1).
    pub tiles_y: u32,
    /// Timestep applied per solver step.
    pub dt: f64,
    /// Amplitude of the uniform noise injected into `phi` each step.
    pub noise_amplitude: f64,
    /// Backward-sample distance scale for semi-Lagrangian advection.
    pub advection_scale: f64,
    /// Five-point stencil diffusion coefficient.
    pub diffusion: f64,
    /// Rate at which entropy relaxes toward 1.
    pub entropy_coupling: f64,
    /// Optional RNG seed for a reproducible noise sequence.
    pub rng_seed: Option<u64>,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            tiles_x: 4,
            tiles_y: 4,
            dt: 0.05,
            noise_amplitude: 0.02,
            advection_scale: 0.6,
            diffusion: 0.08,
            entropy_coupling: 0.03,
            rng_seed: None,
        }
    }
}

impl FieldConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidConfig(
                "grid dimensions must be non-zero",
            ));
        }
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(ConfigError::InvalidConfig("dt must be finite and positive"));
        }
        if !self.noise_amplitude.is_finite()
            || !self.advection_scale.is_finite()
            || !self.diffusion.is_finite()
            || !self.entropy_coupling.is_finite()
        {
            return Err(ConfigError::InvalidConfig("coefficients must be finite"));
        }
        if self.noise_amplitude < 0.0 || self.diffusion < 0.0 || self.entropy_coupling < 0.0 {
            return Err(ConfigError::InvalidConfig(
                "noise_amplitude, diffusion, and entropy_coupling must be non-negative",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

struct CellUpdate {
    phi: f64,
    vx: f64,
    vy: f64,
    s: f64,
}

/// Advances an owned [`FieldState`] one timestep at a time.
///
/// Tiles are computed once at construction and reused for every step. The
/// noise source is owned and seedable, so a fixed [`FieldConfig::rng_seed`]
/// yields a bit-identical trajectory regardless of how tile tasks are
/// scheduled.
pub struct Solver {
    config: FieldConfig,
    state: FieldState,
    tiles: Vec<Tile>,
    rng: SmallRng,
    time: f64,
}

impl Solver {
    /// Builds a solver, rejecting malformed parameters before any tick runs.
    pub fn new(config: FieldConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = FieldState::new(config.width, config.height);
        let tiles = partition(config.width, config.height, config.tiles_x, config.tiles_y);
        let rng = config.seeded_rng();
        Ok(Self {
            config,
            state,
            tiles,
            rng,
            time: 0.0,
        })
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    /// The current authoritative field state.
    pub fn state(&self) -> &FieldState {
        &self.state
    }

    /// Mutable access to the field, for seeding initial conditions.
    pub fn state_mut(&mut self) -> &mut FieldState {
        &mut self.state
    }

    /// The tile plan used for parallel stepping.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Simulated time accumulated so far.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Advances the field by one timestep.
    ///
    /// The previous generation of `phi` and `s` is captured into read-only
    /// buffers before the parallel pass, and tile tasks write only their own
    /// output vectors, so no task ever observes a partially-updated neighbor.
    /// Results are written back once every tile has completed.
    pub fn step(&mut self) {
        let w = self.config.width as usize;
        let h = self.config.height as usize;

        let mut phi = vec![0.0_f64; w * h];
        let mut entropy = vec![0.0_f64; w * h];
        for sample in &self.state.samples {
            let idx = sample.y as usize * w + sample.x as usize;
            phi[idx] = sample.phi;
            entropy[idx] = sample.s;
        }

        // Drawn sequentially in row-major order so the sequence consumed is
        // independent of tile scheduling.
        let noise = self.draw_noise(w * h);

        let config = &self.config;
        let phi_prev = &phi;
        let entropy_prev = &entropy;
        let noise_buf = &noise;

        // The per-cell update rule, reading only previous-generation buffers.
        let update_cell = |x: usize, y: usize| -> CellUpdate {
            let idx = y * w + x;
            let d = config.diffusion;

            // Five-point diffusion stencil; out-of-bounds neighbors are
            // omitted (zero-flux boundary, no wraparound).
            let mut acc = phi_prev[idx] * (1.0 - 4.0 * d);
            if x > 0 {
                acc += d * phi_prev[idx - 1];
            }
            if x + 1 < w {
                acc += d * phi_prev[idx + 1];
            }
            if y > 0 {
                acc += d * phi_prev[idx - w];
            }
            if y + 1 < h {
                acc += d * phi_prev[idx + w];
            }

            // Rigid-rotation velocity about the integer grid center,
            // independent of phi.
            let cx = (x as i64 - w as i64 / 2) as f64;
            let cy = (y as i64 - h as i64 / 2) as f64;
            let r = cx.hypot(cy) + 1e-6;
            let wx = -cy / r;
            let wy = cx / r;

            // Semi-Lagrangian backward sample, round-to-nearest, clamped to
            // the grid.
            let ax = clamp_index(x as i64 - (config.advection_scale * wx).round() as i64, w);
            let ay = clamp_index(y as i64 - (config.advection_scale * wy).round() as i64, h);
            acc = 0.5 * acc + 0.5 * phi_prev[ay * w + ax];

            let s = entropy_prev[idx]
                + config.entropy_coupling * (1.0 - entropy_prev[idx]) * config.dt;

            acc += config.noise_amplitude * noise_buf[idx];

            CellUpdate {
                phi: acc,
                vx: wx,
                vy: wy,
                s,
            }
        };

        let updates: Vec<Vec<(usize, CellUpdate)>> = self
            .tiles
            .par_iter()
            .map(|tile| {
                let mut out = Vec::with_capacity(tile.cell_count());
                for y in tile.y0 as usize..tile.y1 as usize {
                    for x in tile.x0 as usize..tile.x1 as usize {
                        out.push((y * w + x, update_cell(x, y)));
                    }
                }
                out
            })
            .collect();

        for tile_updates in updates {
            for (idx, update) in tile_updates {
                let sample = &mut self.state.samples[idx];
                sample.phi = update.phi;
                sample.vx = update.vx;
                sample.vy = update.vy;
                sample.s = update.s;
            }
        }

        self.time += self.config.dt;
    }

    fn draw_noise(&mut self, cells: usize) -> Vec<f64> {
        if self.config.noise_amplitude == 0.0 {
            return vec![0.0; cells];
        }
        (0..cells)
            .map(|_| self.rng.random_range(-1.0..1.0))
            .collect()
    }
}

fn clamp_index(value: i64, len: usize) -> usize {
    value.clamp(0, len as i64 - 1) as usize
}
