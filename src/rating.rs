use std::{cmp::Ordering, collections::HashMap};

/// Review count and mean rating for one film.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RatingSummary {
    pub count: u64,
    pub average: f64,
}

impl RatingSummary {
    pub fn from_ratings<I>(ratings: I) -> Self
    where
        I: IntoIterator<Item = i32>,
    {
        let (count, total) =
            ratings.into_iter().fold((0u64, 0i64), |(n, sum), r| (n + 1, sum + i64::from(r)));
        if count == 0 {
            return Self::default();
        }
        Self { count, average: round_2dp(total as f64 / count as f64) }
    }

    /// A film with no reviews is unrated, which is not the same as rated zero.
    pub fn is_rated(&self) -> bool {
        self.count > 0
    }
}

/// Round half-up to two decimal places.
pub fn round_2dp(value: f64) -> f64 {
    (value * 100.0 + 0.5).floor() / 100.0
}

/// Folds `(film_id, rating)` rows into per-film summaries.
pub fn summarize_by_film<I>(rows: I) -> HashMap<i32, RatingSummary>
where
    I: IntoIterator<Item = (i32, i32)>,
{
    let mut grouped: HashMap<i32, Vec<i32>> = HashMap::new();
    for (film_id, rating) in rows {
        grouped.entry(film_id).or_default().push(rating);
    }
    grouped.into_iter().map(|(id, ratings)| (id, RatingSummary::from_ratings(ratings))).collect()
}

/// Orders items for a rating sort.
///
/// Rated items are ordered by average (ascending or descending); unrated items
/// are ordered by id and placed first for ascending sorts, last for descending.
/// Equal averages keep their incoming order.
pub fn sort_by_rating<T, F>(items: Vec<T>, descending: bool, key: F) -> Vec<T>
where
    F: Fn(&T) -> (i32, RatingSummary),
{
    let (mut rated, mut unrated): (Vec<T>, Vec<T>) =
        items.into_iter().partition(|item| key(item).1.is_rated());

    rated.sort_by(|a, b| {
        let ord = key(a).1.average.partial_cmp(&key(b).1.average).unwrap_or(Ordering::Equal);
        if descending { ord.reverse() } else { ord }
    });
    unrated.sort_by_key(|item| key(item).0);

    if descending {
        rated.extend(unrated);
        rated
    } else {
        unrated.extend(rated);
        unrated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(ratings: &[i32]) -> RatingSummary {
        RatingSummary::from_ratings(ratings.iter().copied())
    }

    #[test]
    fn average_is_mean_of_ratings() {
        let s = summary(&[4, 5]);
        assert_eq!(s.count, 2);
        assert_eq!(s.average, 4.5);
        assert!(s.is_rated());
    }

    #[test]
    fn no_reviews_is_unrated() {
        let s = summary(&[]);
        assert_eq!(s, RatingSummary { count: 0, average: 0.0 });
        assert!(!s.is_rated());
    }

    #[test]
    fn rounds_to_two_places() {
        assert_eq!(summary(&[1, 2, 2]).average, 1.67);
        assert_eq!(summary(&[7, 8, 8]).average, 7.67);
        assert_eq!(summary(&[1, 1, 2]).average, 1.33);
        assert_eq!(summary(&[10]).average, 10.0);
        assert_eq!(round_2dp(2.125), 2.13);
    }

    #[test]
    fn groups_rows_per_film() {
        let summaries = summarize_by_film([(1, 4), (2, 2), (1, 5)]);
        assert_eq!(summaries[&1], RatingSummary { count: 2, average: 4.5 });
        assert_eq!(summaries[&2], RatingSummary { count: 1, average: 2.0 });
        assert!(!summaries.contains_key(&3));
    }

    fn films() -> Vec<(i32, RatingSummary)> {
        vec![
            (1, summary(&[4, 5])),
            (5, summary(&[])),
            (2, summary(&[])),
            (3, summary(&[2])),
            (4, summary(&[9, 10, 8])),
        ]
    }

    #[test]
    fn ascending_puts_unrated_first_by_id() {
        let ordered: Vec<i32> =
            sort_by_rating(films(), false, |f| *f).into_iter().map(|f| f.0).collect();
        assert_eq!(ordered, vec![2, 5, 3, 1, 4]);
    }

    #[test]
    fn descending_puts_rated_first_non_increasing() {
        let ordered = sort_by_rating(films(), true, |f| *f);
        let ids: Vec<i32> = ordered.iter().map(|f| f.0).collect();
        assert_eq!(ids, vec![4, 1, 3, 2, 5]);

        let first_unrated = ordered.iter().position(|f| !f.1.is_rated()).unwrap();
        assert!(ordered[first_unrated..].iter().all(|f| !f.1.is_rated()));
        assert!(ordered[..first_unrated].windows(2).all(|w| w[0].1.average >= w[1].1.average));
    }
}
