//! Macros for building call arguments.

/// Build an [`Args`](crate::core::Args) bag from `name => value` pairs.
///
/// Values are converted with `serde_json::json!`, so anything serializable
/// works, including nested literals. Wrap compound expressions such as
/// `-amount` in parentheses.
///
/// # Example
///
/// ```
/// use warrant::args;
///
/// let args = args! {
///     "from" => "alice",
///     "amount" => 50,
///     "memo" => { "ref": 7 },
/// };
///
/// assert_eq!(args.get::<String>("from").unwrap(), "alice");
/// assert_eq!(args.get::<u64>("amount").unwrap(), 50);
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::core::Args::new()
    };
    ($($name:expr => $value:tt),+ $(,)?) => {{
        let mut args = $crate::core::Args::new();
        $(
            args.set($name, $crate::__private::json!($value));
        )+
        args
    }};
}
