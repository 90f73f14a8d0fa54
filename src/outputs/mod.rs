//! Output generation for assembled feeds.
//!
//! One submodule today:
//!
//! - [`json`]: writes each normalized feed as a JSON document
//!
//! # Output structure
//!
//! ```text
//! out_dir/
//! ├── tsdm/
//! │   └── 2025-05-06.json
//! └── sdu-ygb/
//!     └── 2025-05-06.json
//! ```

pub mod json;
