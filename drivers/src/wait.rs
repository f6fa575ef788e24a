/*++

Licensed under the Apache-2.0 license.

File Name:

    wait.rs

Abstract:

    Busy-wait helpers for peripheral synchronization points.

--*/

/// Spin until `predicate` holds. May block the calling thread indefinitely;
/// a wedged peripheral is expected to be caught by a supervisory watchdog,
/// not by this routine.
pub fn until<F>(predicate: F)
where
    F: Fn() -> bool,
{
    while !predicate() {}
}
