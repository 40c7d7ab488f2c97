// Write a drive parameter record to stable storage
//
// Usage: cargo run --example write_params -- [path]
//
// Writes the default record; edit the values below to calibrate.

use std::path::Path;

use omnibase_zenoh_runtime::config::{PARAMS_OFFSET, PARAMS_PATH};
use omnibase_zenoh_runtime::params::StoredParams;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| PARAMS_PATH.to_string());

    let params = StoredParams::default();
    params.save(Path::new(&path), PARAMS_OFFSET)?;

    println!("Wrote {} bytes to {} @ {}", StoredParams::SIZE, path, PARAMS_OFFSET);
    println!("{:#?}", params);
    Ok(())
}
