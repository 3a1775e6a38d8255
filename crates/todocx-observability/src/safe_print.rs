// Best-effort stderr logging that never panics.
//
// On the Windows GUI subsystem there is no console, and `eprintln!` panics on
// write errors. Stderr write failures are ignored instead.

#[macro_export]
macro_rules! safe_eprintln {
    ($($arg:tt)*) => {{
        use std::io::Write;
        let _ = writeln!(std::io::stderr(), $($arg)*);
    }};
}
