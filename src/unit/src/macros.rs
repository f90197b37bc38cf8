/// Declares the tests of a module, grouped by suite. Tests are named
/// `<Suite>.<function>`. A `test_type!` macro naming the driver's test
/// type must be in scope.
#[macro_export]
macro_rules! declare_tests {
    (@entry($builder:expr, $suite:expr, $fn:ident)) => {
        $crate::declare_tests!(@entry($builder, $suite, ($fn)));
    };
    (@entry($builder:expr, $suite:expr, ($(#[$attr:ident])* $fn:ident))) => {
        let name = format!("{}.{}", $suite, stringify!($fn));
        let test = $crate::TestAttrs::new()
            $(.$attr())*
            .build_test(name, $fn as _);
        $builder.add_test(test);
    };
    ($($suite:literal => [$($entry:tt),*$(,)*]),*$(,)*) => {
        pub(crate) fn __collect_tests
            (builder: &mut $crate::TestDriverBuilder<test_type!()>)
        {
            $($($crate::declare_tests!(@entry(builder, $suite, $entry));)*)*
        }
    };
}

#[macro_export]
macro_rules! collect_tests {
    ($($($seg:ident)::+),*$(,)*) => {
        pub(crate) fn __collect_tests
            (builder: &mut $crate::TestDriverBuilder<test_type!()>)
        {
            $($($seg::)*__collect_tests(builder);)*
        }
    }
}
