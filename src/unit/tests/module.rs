#[macro_use]
extern crate layercheck_unit;

macro_rules! test_type {
    () => { layercheck_unit::PlainTest }
}

fn mul(a: i32, b: i32) -> i32 {
    a * b
}

mod tests {
    use crate::red::add;
    use super::*;

    fn is_associative() {
        assert_eq!(mul(2, 3), mul(3, 2));
    }

    fn is_distributive() {
        assert_eq!(mul(2, add(3, 4)), add(mul(2, 3), mul(2, 4)));
    }

    #[allow(unconditional_panic)]
    fn divide_by_zero_panics() {
        let zero = 0;
        assert_eq!(1 / zero, 0);
    }

    declare_tests![
        "Mul" => [
            is_associative,
            is_distributive,
            (#[should_err] divide_by_zero_panics),
        ],
    ];
}

collect_tests![
    tests,
    red,
    blue,
];

mod red {
    pub fn add(a: i32, b: i32) -> i32 {
        a + b
    }

    mod tests {
        use super::*;

        fn is_commutative() {
            assert_eq!(add(1, 2), add(2, 1));
        }

        fn is_associative() {
            assert_eq!(add(1, add(2, 3)), add(add(1, 2), 3));
        }

        fn is_idempotent() {
            // Might take a while implementing this one...
            assert_eq!(add(1, 1), 1);
        }

        declare_tests![
            "Add" => [is_commutative, is_associative],
            "PositiveAdd" => [(#[xfail] is_idempotent)],
        ];
    }

    collect_tests![tests];
}

mod blue {
    pub fn sub(a: i32, b: i32) -> i32 {
        a - b
    }

    mod tests {
        use super::*;

        fn is_anticommutative() {
            assert_eq!(sub(1, 2), -sub(2, 1));
        }

        fn is_commutative() {
            assert_eq!(sub(1, 2), sub(2, 1));
        }

        declare_tests![
            "Sub" => [
                is_anticommutative,
                (#[ignore] is_commutative),
            ],
        ];
    }

    collect_tests![tests];
}

fn main() {
    use layercheck_unit::*;
    let mut builder = TestDriverBuilder::new();
    crate::__collect_tests(&mut builder);

    let names: Vec<_> = builder.tests().iter().map(|t| t.name()).collect();
    assert_eq!(names, [
        "Mul.is_associative",
        "Mul.is_distributive",
        "Mul.divide_by_zero_panics",
        "Add.is_commutative",
        "Add.is_associative",
        "PositiveAdd.is_idempotent",
        "Sub.is_anticommutative",
        "Sub.is_commutative",
    ]);
    assert_eq!(builder.tests()[5].suite(), "PositiveAdd");

    let mut driver = builder.build_basic();
    driver.run();
    let counts = driver.counts();
    assert_eq!(counts[Outcome::Passed], 6);
    assert_eq!(counts[Outcome::Xfailed], 1);
    assert_eq!(counts[Outcome::Ignored], 1);
    assert_eq!(driver.exit_code(), 0);
}
