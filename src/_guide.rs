/*!

Tutorials, overviews, and etc... for the `mutandis` crate.

All the documentation that isn't API reference.

# Table of Contents

* [Writing a Runner for Your VM][runners]
* [Integrating with a Coverage-Guided Fuzzer][fuzzer_integration]
* [Cargo Features][cargo_features]
* [Minimum Supported Rust Version][msrv]

 */

pub mod cargo_features;
pub mod fuzzer_integration;
pub mod msrv;
pub mod runners;
