/// Mark the members of one longest strictly increasing subsequence.
///
/// Runs in `O(n log n)`. Returns a mask parallel to `values`.
pub(crate) fn longest_increasing_subsequence(values: &[usize]) -> Vec<bool> {
    // tails[k]: index of the smallest tail of an increasing run of length k + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; values.len()];

    for (index, value) in values.iter().enumerate() {
        let position = tails.partition_point(|&tail| values[tail] < *value);
        if position > 0 {
            previous[index] = Some(tails[position - 1]);
        }
        if position == tails.len() {
            tails.push(index);
        } else {
            tails[position] = index;
        }
    }

    let mut keep = vec![false; values.len()];
    let mut current = tails.last().copied();
    while let Some(index) = current {
        keep[index] = true;
        current = previous[index];
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn picked(values: &[usize]) -> Vec<usize> {
        values
            .iter()
            .zip(longest_increasing_subsequence(values))
            .filter_map(|(value, keep)| keep.then_some(*value))
            .collect()
    }

    #[test]
    fn test_sorted_input_keeps_all() {
        assert_eq!(picked(&[0, 1, 2, 3]), vec![0, 1, 2, 3]);
        assert!(picked(&[]).is_empty());
    }

    #[test]
    fn test_single_displacement() {
        assert_eq!(picked(&[3, 0, 1, 2]), vec![0, 1, 2]);
        assert_eq!(picked(&[0, 5, 2, 3, 4, 1, 6]), vec![0, 2, 3, 4, 6]);
    }

    #[test]
    fn test_reversed_keeps_one() {
        assert_eq!(picked(&[4, 3, 2, 1]).len(), 1);
    }
}
