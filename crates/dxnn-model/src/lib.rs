#![deny(unsafe_code)]

//! Loader for compiled `.dxnn` model containers
//!
//! A `.dxnn` file is the single-file output of the model compiler: a short
//! header, the input/output tensor tables, and opaque weight and
//! register-map sections. The runtime only needs the header and tables
//! (buffer sizing and submission validation), so that is all this crate
//! parses. Kernel programming data is passed through untouched.
//!
//! # Example
//!
//! ```no_run
//! use dxnn_model::Model;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let model = Model::from_file("model.dxnn")?;
//!
//! println!("Model: {} (.dxnn v{})", model.name(), model.version());
//! println!("Input: {} bytes, output: {} bytes",
//!          model.input_size(), model.output_size());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod error;
mod model;
mod parser;

pub use error::{ModelError, Result};
pub use model::{DataType, Model, TensorInfo};
pub use parser::{DXNN_MAGIC, MAX_FILE_VERSION, MIN_FILE_VERSION};
