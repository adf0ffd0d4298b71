//! Register-program compiler for the Vortex CNN accelerator family.
//!
//! Lowers a quantized network description onto a fixed-function device:
//! validation against the device's capability profile, expansion and
//! group/lane mapping, kernel/bias/data address allocation, per-layer
//! register encoding (including the streaming buffer arithmetic), and
//! rendering into a test-bench memory image or C-like register-write
//! source with an optional compacted expected-output verify table.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`error`] | [`CodegenError`] and the crate [`Result`] alias |
//! | [`network`] | Network/layer description fed into the compiler |
//! | [`config`] | [`RunConfig`] — per-run options, artifact kind |
//! | [`diag`] | Severity taxonomy and diagnostic accumulation |
//! | [`validate`] | Capability validator (device/run/layer gates) |
//! | [`plan`] | Expansion and hardware-mapping planner |
//! | [`memory`] | Kernel/bias allocators, capacity and overlap checks |
//! | [`encode`] | Per-layer register encoder, streaming arithmetic |
//! | [`sink`] | Instruction sink: artifact rendering, verify compaction |
//! | [`emit`] | Write-path glue: byte packer, zero skipping, tracking |
//! | [`simulate`] | Reference model producing expected outputs |
//! | [`backend`] | [`generate`] — the full pipeline over one network |
//!
//! # Quick start
//!
//! ```no_run
//! use vortex_codegen::network::{LayerSpec, Network, Weights};
//! use vortex_codegen::{generate, RunConfig};
//! use vortex_chip::DeviceProfile;
//!
//! # fn main() -> vortex_codegen::Result<()> {
//! let mut layer = LayerSpec::conv2d(1, 4, [8, 8]);
//! layer.processor_map = 0x1;
//! layer.output_processor_map = 0xf;
//! layer.weights = Weights::new(vec![1; 4 * 9], 4, 1, 3, 3);
//! let net = Network::new(vec![layer]);
//!
//! let out = std::fs::File::create("cnn_load.c")?;
//! let report = generate(
//!     &net,
//!     &DeviceProfile::vtx700(),
//!     &RunConfig::default(),
//!     None,
//!     None,
//!     Box::new(out),
//! )?;
//! println!("{} write(s), {:.3} ms", report.writes, report.access_time_ms);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod backend;
pub mod config;
pub mod diag;
pub mod emit;
pub mod encode;
pub mod error;
pub mod memory;
pub mod network;
pub mod plan;
pub mod simulate;
pub mod sink;
pub mod validate;

pub use backend::{generate, generate_with_api, GenerateReport};
pub use config::{RunConfig, SinkKind};
pub use diag::{Diagnostic, Severity};
pub use error::{CodegenError, Result};

/// Common imports for compiler consumers.
pub mod prelude {
    pub use crate::backend::{generate, generate_with_api, GenerateReport};
    pub use crate::config::{RunConfig, SinkKind};
    pub use crate::diag::{Diagnostic, Severity};
    pub use crate::error::{CodegenError, Result};
    pub use crate::network::{
        Activation, EltwiseOp, LayerSpec, Network, Operator, Quantization, Weights,
    };
    pub use crate::simulate::{FixedPointSimulator, LayerSimulator, Tensor};
    pub use vortex_chip::{DeviceProfile, DeviceVariant};
}
