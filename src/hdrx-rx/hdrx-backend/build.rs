// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    if env::var_os("CARGO_FEATURE_RTLSDR").is_some() {
        println!("cargo:rustc-link-lib=rtlsdr");
    }
    if env::var_os("CARGO_FEATURE_HACKRF").is_some() {
        println!("cargo:rustc-link-lib=hackrf");
    }
    if env::var_os("CARGO_FEATURE_SDRPLAY").is_some() {
        println!("cargo:rustc-link-lib=sdrplay_api");
    }
}
