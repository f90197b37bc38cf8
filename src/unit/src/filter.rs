use regex::{Regex, RegexSet};

use crate::Test;

pub trait TestFilter<T>: std::fmt::Debug {
    fn is_match(&self, test: &T) -> bool;
}

impl<T, F: TestFilter<T> + ?Sized> TestFilter<T> for Box<F> {
    fn is_match(&self, test: &T) -> bool {
        (**self).is_match(test)
    }
}

impl<T, F: TestFilter<T>> TestFilter<T> for Option<F> {
    fn is_match(&self, test: &T) -> bool {
         self.as_ref().map_or(true, |filter| filter.is_match(test))
    }
}

impl<D> TestFilter<Test<D>> for Regex {
    fn is_match(&self, test: &Test<D>) -> bool {
        self.is_match(&test.name)
    }
}

impl<D> TestFilter<Test<D>> for RegexSet {
    fn is_match(&self, test: &Test<D>) -> bool {
        self.is_match(&test.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestAttrs;

    #[test]
    fn regex_filters_by_full_name() {
        let test = TestAttrs::new()
            .build_test("PositiveLayerTest.sampler".to_owned(), ());
        let filter = Some(Regex::new(r"^Positive").unwrap());
        assert!(filter.is_match(&test));
        let filter = Some(Regex::new(r"^LayerTest\.").unwrap());
        assert!(!filter.is_match(&test));
        let filter: Option<Regex> = None;
        assert!(filter.is_match(&test));
    }
}
