/// Native module runs guest code on a local Python interpreter,
/// standing in for the in-browser runtime outside of a browser.
pub mod runtime;
