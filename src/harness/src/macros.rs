/// Unwraps an API result, returning a fatal failure from the enclosing
/// test when the call did not succeed.
#[macro_export]
macro_rules! assert_vk_success {
    ($e:expr) => {
        match $e {
            Ok(value) => value,
            Err(err) => return Err($crate::__unit::Abort::fatal(format!(
                "{} returned {}", stringify!($e), err,
            ))),
        }
    };
}

/// Declares a wrapper that owns a device child object and destroys it
/// on drop.
macro_rules! device_object {
    (
        $(#[$attr:meta])*
        pub struct $name:ident($ty:ty) => $destroy:ident;
    ) => {
        $(#[$attr])*
        #[derive(Debug)]
        pub struct $name {
            device: std::sync::Arc<crate::Device>,
            inner: $ty,
        }

        impl $name {
            pub fn device(&self) -> &std::sync::Arc<crate::Device> {
                &self.device
            }

            pub fn handle(&self) -> $ty {
                self.inner
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                log::trace!(
                    concat!(stringify!($name), "::drop({:?})"), self.inner);
                unsafe { self.device.table().$destroy(self.inner, None); }
            }
        }
    };
}
