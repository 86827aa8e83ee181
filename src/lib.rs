//! Real-time stable-fluids simulation: semi-Lagrangian advection, a Jacobi
//! pressure projection, dye transport and a particle swarm, run on the
//! CPU with rayon or on the GPU with wgpu compute.

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod field;
pub mod gpu;
pub mod palette;
pub mod particles;
pub mod passes;
pub mod pointer;
pub mod quality;
pub mod render;
pub mod state;

pub use config::{Settings, SettingsPatch};
pub use driver::{FrameClock, FrameDriver, PointerScript};
pub use engine::{FluidEngine, MAX_DT};
pub use error::{Result, SimError};
pub use field::{Capabilities, DoubleBuffer, Field, Grid, Precision};
pub use pointer::{PointerState, PointerTracker};
pub use quality::Viewport;
pub use render::Frame;
pub use state::SimulationState;
