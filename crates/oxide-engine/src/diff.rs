//! Set/slice difference for nested-record collections

/// Elements of `a` that have no counterpart in `b`.
///
/// Comparison is by content, so the result is stable under reordering of
/// either input. Duplicates are matched one to one.
pub fn slice_diff<T: PartialEq + Clone>(a: &[T], b: &[T]) -> Vec<T> {
    slice_diff_by(a, b, |x, y| x == y)
}

/// Like [`slice_diff`], with a caller-supplied equality.
pub fn slice_diff_by<T, F>(a: &[T], b: &[T], eq: F) -> Vec<T>
where
    T: Clone,
    F: Fn(&T, &T) -> bool,
{
    let mut consumed = vec![false; b.len()];
    let mut out = Vec::new();
    for x in a {
        match b
            .iter()
            .enumerate()
            .position(|(i, y)| !consumed[i] && eq(x, y))
        {
            Some(i) => consumed[i] = true,
            None => out.push(x.clone()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Range {
        first: &'static str,
        last: &'static str,
    }

    fn r(first: &'static str, last: &'static str) -> Range {
        Range { first, last }
    }

    #[test]
    fn test_diff_by_content() {
        let prior = vec![
            r("172.20.15.227", "172.20.15.230"),
            r("172.20.15.231", "172.20.15.233"),
        ];
        let planned = vec![r("172.20.15.227", "172.20.15.230")];

        assert!(slice_diff(&planned, &prior).is_empty());
        assert_eq!(
            slice_diff(&prior, &planned),
            vec![r("172.20.15.231", "172.20.15.233")]
        );
    }

    #[test]
    fn test_diff_ignores_order() {
        let a = vec![1, 2, 3];
        let b = vec![3, 1, 2];
        assert!(slice_diff(&a, &b).is_empty());
        assert!(slice_diff(&b, &a).is_empty());
    }

    #[test]
    fn test_diff_duplicates() {
        assert_eq!(slice_diff(&[1, 1, 2], &[1, 2]), vec![1]);
    }

    #[test]
    fn test_diff_by_key() {
        let a = vec![("web", 1), ("db", 2)];
        let b = vec![("web", 9)];
        let out = slice_diff_by(&a, &b, |x, y| x.0 == y.0);
        assert_eq!(out, vec![("db", 2)]);
    }
}
