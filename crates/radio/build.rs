// Copyright 2025-2026 CEMAXECUTER LLC

fn main() {
    #[cfg(feature = "ubertooth")]
    {
        println!("cargo:rustc-link-lib=ubertooth");
        println!("cargo:rustc-link-lib=usb-1.0");
    }
}
