use rand::RngCore;

const SEED_STRIDE: u32 = 1009;

/// mulberry32: a 32-bit state generator producing the same stream as the
/// browser client, so both agree on each student's question order.
#[derive(Debug, Clone)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Uniform float in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / 4_294_967_296.0
    }
}

impl RngCore for Mulberry32 {
    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6d2b_79f5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    fn next_u64(&mut self) -> u64 {
        let high = u64::from(self.next_u32());
        (high << 32) | u64::from(self.next_u32())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

/// Seed for a student's view of an exercise.
///
/// A missing or non-numeric student id counts as 0.
pub fn seed_for(student_id: Option<&str>, exercise_id: u32) -> u32 {
    let student = student_id
        .and_then(|id| id.trim().parse::<i64>().ok())
        .map_or(0, |id| id as u32);
    student.wrapping_add(exercise_id.wrapping_mul(SEED_STRIDE))
}

/// Fisher-Yates from the last index down; returns a shuffled copy.
pub fn seeded_shuffle<T: Clone>(items: &[T], rng: &mut Mulberry32) -> Vec<T> {
    let mut shuffled = items.to_vec();
    for i in (1..shuffled.len()).rev() {
        let j = (rng.next_f64() * (i + 1) as f64).floor() as usize;
        shuffled.swap(i, j);
    }
    shuffled
}
