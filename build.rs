//! Include revision information and time into the build.
//!
//! Shown in the banner so a saved mapping can be tied back to the tool that made it.

fn main() {
    let _ = build_data::set_GIT_COMMIT();
    let _ = build_data::set_GIT_DIRTY();
    let _ = build_data::set_BUILD_TIMESTAMP();
}
