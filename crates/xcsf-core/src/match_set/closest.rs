use rand::Rng;

/// A population slot competing for closest-classifier matching.
#[derive(Debug, Clone, Copy)]
pub(super) struct Candidate {
    pub(super) activity: f64,
    pub(super) numerosity: u32,
    pub(super) index: usize,
}

/// Ranges longer than this pick their pivot as the median of three random entries.
const MEDIAN_OF_THREE_MIN_LEN: usize = 21;

/// Moves the most active candidates to the front until they account for at least
/// `count` micro-classifiers, and returns how many leading candidates that takes.
///
/// Runs in expected linear time. Candidates with equal activity are ordered
/// arbitrarily, so which of them are selected at the boundary is unspecified.
pub(super) fn select_closest<R>(candidates: &mut [Candidate], count: usize, rng: &mut R) -> usize
where
    R: Rng + ?Sized,
{
    partial_select(candidates, count, rng);
    let mut numerosity = 0;
    for (i, candidate) in candidates.iter().enumerate() {
        numerosity += candidate.numerosity as usize;
        if numerosity >= count {
            return i + 1;
        }
    }
    candidates.len()
}

fn partial_select<R>(mut range: &mut [Candidate], mut count: usize, rng: &mut R)
where
    R: Rng + ?Sized,
{
    while count > 0 && range.len() > 1 {
        let current = std::mem::take(&mut range);
        let end = current.len() - 1;
        if current.len() > MEDIAN_OF_THREE_MIN_LEN {
            let chosen = median_of_three(current, rng);
            current.swap(chosen, end);
        }
        let pivot = current[end];

        // Entries at least as active as the pivot go left.
        let mut store = 0;
        let mut left_numerosity = 0;
        for j in 0..end {
            if pivot.activity <= current[j].activity {
                current.swap(j, store);
                left_numerosity += current[store].numerosity as usize;
                store += 1;
            }
        }
        current.swap(store, end);
        let pivot_numerosity = pivot.numerosity as usize;

        if count < left_numerosity {
            range = &mut current[..store];
        } else if count < left_numerosity + pivot_numerosity {
            return;
        } else {
            count -= left_numerosity + pivot_numerosity;
            range = &mut current[store + 1..];
        }
    }
}

fn median_of_three<R>(range: &[Candidate], rng: &mut R) -> usize
where
    R: Rng + ?Sized,
{
    let mut picks = [(); 3].map(|()| rng.random_range(0..range.len()));
    picks.sort_by(|&a, &b| range[a].activity.total_cmp(&range[b].activity));
    picks[1]
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg64;

    use super::*;

    fn candidates(rng: &mut Pcg64, len: usize) -> Vec<Candidate> {
        (0..len)
            .map(|index| Candidate {
                activity: rng.random(),
                numerosity: rng.random_range(1..4),
                index,
            })
            .collect()
    }

    #[test]
    fn test_selects_most_active_by_numerosity() {
        let mut rng = Pcg64::seed_from_u64(17);
        for len in [1, 5, 20, 100, 500] {
            for count in [1, 7, 20, 60] {
                let mut cands = candidates(&mut rng, len);
                let selected = select_closest(&mut cands, count, &mut rng);
                let (front, back) = cands.split_at(selected);

                let min_front = front.iter().map(|c| c.activity).fold(f64::INFINITY, f64::min);
                assert!(back.iter().all(|c| c.activity <= min_front));

                let total = front.iter().map(|c| c.numerosity as usize).sum::<usize>();
                if selected < len {
                    assert!(total >= count);
                    let last = front[selected - 1].numerosity as usize;
                    assert!(total - last < count);
                }
            }
        }
    }

    #[test]
    fn test_keeps_every_candidate() {
        let mut rng = Pcg64::seed_from_u64(3);
        let mut cands = candidates(&mut rng, 64);
        select_closest(&mut cands, 10, &mut rng);
        let mut indices = cands.iter().map(|c| c.index).collect::<Vec<_>>();
        indices.sort_unstable();
        assert_eq!(indices, (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn test_count_above_total_selects_all() {
        let mut rng = Pcg64::seed_from_u64(5);
        let mut cands = candidates(&mut rng, 10);
        assert_eq!(select_closest(&mut cands, 1000, &mut rng), 10);
    }
}
