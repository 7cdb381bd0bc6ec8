/// Macro to return early with an error
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::error::Error::Generic(format!($($arg)*)))
    };
}

/// Declare a tree/value struct with the standard derive set
#[macro_export]
macro_rules! common_struct {
    ($(#[$attr:meta])* pub struct $name:ident { $($body:tt)* }) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name { $($body)* }
    };
}

/// Declare a tree/value enum with the standard derive set
#[macro_export]
macro_rules! common_enum {
    ($(#[$attr:meta])* pub enum $name:ident { $($body:tt)* }) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name { $($body)* }
    };
}
