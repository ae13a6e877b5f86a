use std::sync::Arc;

use proptest::prelude::*;

use helm::engine::SoftEngine;
use helm::prelude::*;

fn integer_orchestrator(seed: u64) -> Orchestrator {
    let params = Parameters::builder()
        .poly_degree(1024)
        .coeff_bit_sizes([27])
        .plain_modulus(12289)
        .build()
        .unwrap();
    let mut helm = Orchestrator::with_engine(Arc::new(SoftEngine::with_seed(seed)));
    helm.initialize(Scheme::Integer, &params).unwrap();
    helm.generate_keys().unwrap();
    helm
}

fn real_orchestrator(seed: u64) -> Orchestrator {
    let params = Parameters::builder()
        .poly_degree(2048)
        .coeff_bit_sizes([30, 24])
        .scale(2f64.powi(30))
        .build()
        .unwrap();
    let mut helm = Orchestrator::with_engine(Arc::new(SoftEngine::with_seed(seed)));
    helm.initialize(Scheme::ApproxReal, &params).unwrap();
    helm.generate_keys().unwrap();
    helm
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_integer_round_trip_is_exact(
        values in prop::collection::vec(-6144i32..=6144, 0..=1024),
        seed in any::<u64>(),
    ) {
        let helm = integer_orchestrator(seed);
        let ct = helm.encrypt(values.clone()).unwrap();
        prop_assert_eq!(ct.len(), values.len());
        prop_assert_eq!(helm.decrypt_as::<i32>(&ct).unwrap(), values);
    }

    #[test]
    fn prop_unsigned_round_trip_is_exact(
        values in prop::collection::vec(0u64..12289, 1..=64),
        seed in any::<u64>(),
    ) {
        let helm = integer_orchestrator(seed);
        let ct = helm.encrypt(values.clone()).unwrap();
        prop_assert_eq!(helm.decrypt(&ct).unwrap(), HostArray::UInt64(values));
    }

    #[test]
    fn prop_real_round_trip_is_close(
        values in prop::collection::vec(-1000.0f64..1000.0, 1..=2048),
        seed in any::<u64>(),
    ) {
        let helm = real_orchestrator(seed);
        let ct = helm.encrypt(values.clone()).unwrap();
        let decrypted = helm.decrypt_as::<f64>(&ct).unwrap();
        prop_assert_eq!(decrypted.len(), values.len());
        for (expected, actual) in values.iter().zip(&decrypted) {
            prop_assert!((expected - actual).abs() < 1e-2, "{} vs {}", expected, actual);
        }
    }

    #[test]
    fn prop_oversized_input_rejected(extra in 1usize..64, seed in any::<u64>()) {
        let helm = integer_orchestrator(seed);
        let result = helm.encrypt(vec![0u32; 1024 + extra]);
        let is_oversized = matches!(result, Err(HelmError::OversizedInput { capacity: 1024, .. }));
        prop_assert!(is_oversized);
    }

    #[test]
    fn prop_render_vector_is_bounded(values in prop::collection::vec(any::<i64>(), 0..200)) {
        let rendered = render_vector(&HostArray::Int64(values.clone()), 4, 5);
        let cells = if values.is_empty() { 0 } else { rendered.matches(", ").count() + 1 };
        prop_assert!(cells <= 9);
        if values.len() <= 8 {
            prop_assert_eq!(cells, values.len());
        }
    }
}
