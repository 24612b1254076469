use super::*;

fn distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[test]
fn deterministic_and_fixed_length() {
    let embedder = HashingEmbedder::new(32);
    let first = embedder.embed("Handmade oak tables").expect("should embed");
    let second = embedder.embed("Handmade oak tables").expect("should embed");

    assert_eq!(first.len(), 32);
    assert_eq!(first, second);
}

#[test]
fn vectors_are_normalised() {
    let vector = HashingEmbedder::default()
        .embed("free delivery on all orders")
        .expect("should embed");
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
}

#[test]
fn empty_text_is_zero_vector() {
    let vector = HashingEmbedder::default().embed("  ").expect("should embed");
    assert!(vector.iter().all(|v| *v == 0.0));
}

#[test]
fn shared_words_are_closer() {
    let embedder = HashingEmbedder::default();
    let query = embedder.embed("oak dining table").expect("should embed");
    let related = embedder.embed("solid oak table for dining rooms").expect("should embed");
    let unrelated = embedder.embed("our refund policy lasts thirty days").expect("should embed");

    assert!(distance(&query, &related) < distance(&query, &unrelated));
}

#[test]
fn zero_dimension_is_clamped() {
    assert_eq!(HashingEmbedder::new(0).dimension(), 1);
}
