// XXX: Keep this documented MSRV in sync with the `rust-version` in
// `Cargo.toml`.

/*!

# Minimum Supported Rust Version

The minimum supported Rust version (MSRV) is currently **1.80.0**.

Raising it is a breaking change for campaigns pinned to an older toolchain, so
it will only happen in a minor release.

 */
