//! Reads the build-time configuration file and generates `config.rs` in `OUT_DIR`,
//! exposing the resolved tunables as `pub const` items the crate `include!`s.
//!
//! Trimmed from a fuller kernel build script: this crate has no C sources, no linker
//! script and no target-JSON to manage, so only the configuration-reading half survives.

use serde::Deserialize;
use std::{env, fs, io, path::Path, process::exit};

#[derive(Deserialize)]
struct ConfigPaging {
	page_size: u64,
	n_out: u64,
	n_in: u64,
}

#[derive(Deserialize)]
struct ConfigTlb {
	entries: u64,
}

#[derive(Deserialize)]
struct ConfigProcess {
	kernel_stack_pages: u64,
}

#[derive(Deserialize)]
struct ConfigSwap {
	file_size: u64,
	file_path: String,
}

#[derive(Deserialize)]
struct Config {
	paging: ConfigPaging,
	tlb: ConfigTlb,
	process: ConfigProcess,
	swap: ConfigSwap,
}

impl Config {
	fn read() -> io::Result<Self> {
		const FILE: &str = "build-config.toml";
		const FILE_DEFAULT: &str = "default.build-config.toml";
		println!("cargo:rerun-if-changed={FILE}");
		println!("cargo:rerun-if-changed={FILE_DEFAULT}");
		let raw = match fs::read_to_string(FILE) {
			Ok(s) => s,
			Err(e) if e.kind() == io::ErrorKind::NotFound => fs::read_to_string(FILE_DEFAULT)?,
			Err(e) => return Err(e),
		};
		toml::from_str(&raw).map_err(|e| io::Error::other(e.to_string()))
	}
}

fn main() {
	let config = Config::read().unwrap_or_else(|e| {
		eprintln!("failed to read build configuration: {e}");
		exit(1);
	});
	if !config.paging.page_size.is_power_of_two() {
		eprintln!("paging.page_size must be a power of two");
		exit(1);
	}
	if config.swap.file_size % config.paging.page_size != 0 {
		eprintln!("swap.file_size must be a multiple of paging.page_size");
		exit(1);
	}
	let out_dir = env::var_os("OUT_DIR").unwrap_or_else(|| {
		eprintln!("OUT_DIR environment variable not set");
		exit(1);
	});
	let dest = Path::new(&out_dir).join("config.rs");
	let src = format!(
		concat!(
			"pub const PAGE_SIZE: usize = {};\n",
			"pub const PAGE_MASK: usize = PAGE_SIZE - 1;\n",
			"pub const N_OUT: usize = {};\n",
			"pub const N_IN: usize = {};\n",
			"pub const N_TLB: usize = {};\n",
			"pub const KERNEL_STACK_PAGES: usize = {};\n",
			"pub const SWAP_FILE_SIZE: u64 = {};\n",
			"pub const SWAP_FILE_PATH: &str = {:?};\n",
		),
		config.paging.page_size,
		config.paging.n_out,
		config.paging.n_in,
		config.tlb.entries,
		config.process.kernel_stack_pages,
		config.swap.file_size,
		config.swap.file_path,
	);
	fs::write(&dest, src).unwrap_or_else(|e| {
		eprintln!("failed to write {}: {e}", dest.display());
		exit(1);
	});
}
