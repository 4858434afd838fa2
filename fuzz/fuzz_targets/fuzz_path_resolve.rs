#![no_main]

//! Resolution over arbitrary dotted paths must never panic and must
//! round-trip through parse/display for non-empty segments.

use libfuzzer_sys::fuzz_target;

use tether_core::Path;
use tether_reactive::{Model, SetOptions, Value, attrs, resolve};

fuzz_target!(|raw: &str| {
    let path = Path::parse(raw);

    // Display/parse round-trip.
    let reparsed = Path::parse(&path.to_string());
    assert_eq!(path, reparsed);

    // Resolution against a small graph degrades to Null, never panics.
    let leaf = Model::with_attrs(attrs! { "value" => 1 });
    let root = Model::with_attrs(attrs! { "a" => leaf, "b" => "scalar" });
    root.set(attrs! { "self" => root.clone() }, &SetOptions::silent());

    let resolved = resolve(&path, &Value::Model(root.clone()));
    if path.is_empty() {
        assert!(resolved.as_model().is_some());
    }
});
