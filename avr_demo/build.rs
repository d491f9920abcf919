use std::env;
use std::fs;
use std::path::Path;

// Payload files selectable through Cargo features, first match wins.
const PAYLOADS: &[(&str, &str)] = &[
    ("PAYLOAD_MALFORMED", "payloads/malformed.json"),
    ("PAYLOAD_DEFAULT", "payloads/default.json"),
];

fn main() {
    let out_dir = env::var_os("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("payload.json");

    let source = PAYLOADS
        .iter()
        .find(|(feature, _)| env::var(format!("CARGO_FEATURE_{feature}")).is_ok())
        .map_or("payloads/default.json", |(_, path)| path);

    let mut json = fs::read(source).unwrap();
    // The firmware treats NUL as end of input.
    json.push(0);
    fs::write(&dest_path, json).unwrap();

    for (_, path) in PAYLOADS {
        println!("cargo:rerun-if-changed={path}");
    }
    println!("cargo:rerun-if-changed=build.rs");
}
