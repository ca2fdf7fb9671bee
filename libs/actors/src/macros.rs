//! Macros for declaring actor interfaces.
//!
//! - [`actor_interface!`]: declare a trait whose implementations can be bound
//!   to an [`ActorThread`](crate::ActorThread), together with its proxy
//!
//! # Example
//!
//! ```rust
//! use actor_threads::{actor_interface, ActorThread, ActorThreads, Promise};
//! use std::sync::Arc;
//!
//! actor_interface! {
//!     /// Answers with what it was told
//!     pub trait Echo {
//!         fn say(&self, text: String) -> Promise<String>;
//!         fn ping(&self);
//!     }
//! }
//!
//! struct EchoImpl;
//!
//! impl Echo for EchoImpl {
//!     fn say(&self, text: String) -> Promise<String> {
//!         Promise::wrap(text)
//!     }
//!
//!     fn ping(&self) {}
//! }
//!
//! let threads = ActorThreads::new();
//! let echo = threads.create_thread("echo").bind::<dyn Echo>(Arc::new(EchoImpl));
//!
//! echo.tell().ping();
//! assert_eq!(echo.tell().say("hi".to_string()).get().unwrap(), Some("hi".to_string()));
//! ```

/// Declare an actor interface.
///
/// Methods take `&self` plus owned arguments implementing `Debug` and either
/// return nothing or return a [`Promise`](crate::Promise). The macro expands
/// to:
///
/// - the trait itself, with `Send + Sync + 'static` as supertraits
/// - an implementation of the trait for [`ActorProxy<dyn Trait>`](crate::ActorProxy)
///   that turns every call into a message
/// - [`ActorInterface`](crate::ActorInterface) for `dyn Trait`
///
/// Arguments appear in message descriptions through their `Debug` output;
/// wrap sensitive ones in [`Redacted`](crate::Redacted).
#[macro_export]
macro_rules! actor_interface {
    (
        $(#[$meta:meta])*
        $vis:vis trait $name:ident {
            $(
                $(#[$method_meta:meta])*
                fn $method:ident(&self $(, $arg:ident : $arg_ty:ty)*) $(-> $ret:ty)?;
            )*
        }
    ) => {
        $(#[$meta])*
        $vis trait $name: Send + Sync + 'static {
            $(
                $(#[$method_meta])*
                fn $method(&self $(, $arg: $arg_ty)*) $(-> $ret)?;
            )*

            #[doc(hidden)]
            fn __actor_type_name(&self) -> &'static str {
                ::std::any::type_name::<Self>()
            }
        }

        impl $name for $crate::ActorProxy<dyn $name> {
            $(
                #[track_caller]
                fn $method(&self $(, $arg: $arg_ty)*) $(-> $ret)? {
                    $crate::__actor_proxy_method!(self, $method, ($($arg),*) $(, $ret)?)
                }
            )*
        }

        impl $crate::ActorInterface for dyn $name {
            fn proxy(
                sender: ::std::sync::Arc<dyn $crate::MessageSender<Self>>,
            ) -> ::std::sync::Arc<Self> {
                ::std::sync::Arc::new($crate::ActorProxy::<dyn $name>::new(sender))
            }

            fn interface_name() -> &'static str {
                stringify!($name)
            }

            fn actor_name(&self) -> &'static str {
                $crate::__simple_type_name(self.__actor_type_name())
            }
        }
    };
}

/// Body of one generated proxy method
#[doc(hidden)]
#[macro_export]
macro_rules! __actor_proxy_method {
    ($proxy:expr, $method:ident, ($($arg:ident),*)) => {{
        let args = $crate::describe_args(&[$(&$arg as &dyn ::std::fmt::Debug),*]);
        $proxy.send(
            stringify!($method),
            args,
            ::std::panic::Location::caller(),
            move |actor| actor.$method($($arg),*),
        )
    }};
    ($proxy:expr, $method:ident, ($($arg:ident),*), $ret:ty) => {{
        let args = $crate::describe_args(&[$(&$arg as &dyn ::std::fmt::Debug),*]);
        $proxy.request(
            stringify!($method),
            args,
            ::std::panic::Location::caller(),
            move |actor| actor.$method($($arg),*),
        )
    }};
}
