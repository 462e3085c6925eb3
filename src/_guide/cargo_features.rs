/*!

# Cargo Features

None of this crate's features are enabled by default.

* **`log`**: Enable logging with [the `log` crate](https://docs.rs/log). The
  campaign logs each iteration's mutation kind at `info`, failed and undone
  mutations at `warn`, batch rollbacks at `debug`, and fatal staging errors,
  together with the last program dump, at `error`. With the feature enabled,
  [`Session::run`][crate::Session::run] also logs the status screen at `info`
  every report interval.

 */
