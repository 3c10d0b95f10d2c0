//! Integration tests for rulebook construction, caching and inversion.

mod common;

use common::{create_cpu_client, create_sequential_client, create_threaded_client, random_sparse, seeded_rng};
use spconv::error::Error;
use spconv::ops::ConvGeometry;
use spconv::sparse::{
    ConvMode, CoordinateSet, GridPolicy, Rulebook, build_rulebook, invert_rulebook,
};
use std::collections::HashSet;
use std::sync::Arc;

fn sites(indices: Vec<i32>, spatial: &[usize], batch_size: usize) -> Arc<CoordinateSet> {
    Arc::new(CoordinateSet::new(indices, spatial, batch_size).unwrap())
}

fn pair_set(rulebook: &Rulebook, offset: usize) -> Vec<(usize, usize)> {
    rulebook.pairs(offset).iter().collect()
}

// =============================================================================
// Submanifold Pairing
// =============================================================================

#[test]
fn test_two_site_submanifold_pairs() {
    let client = create_cpu_client();
    // (batch, y, x): (0,0,0) and (0,1,1), 3x3 kernel, stride 1, padding 1
    let input = sites(vec![0, 0, 0, 0, 1, 1], &[4, 4], 1);
    let geometry = ConvGeometry::submanifold(2, 3);
    let rb = build_rulebook(&client, &input, &geometry, ConvMode::Submanifold).unwrap();

    assert!(Arc::ptr_eq(rb.output_sites(), &input));
    assert_eq!(rb.num_offsets(), 9);

    // center offset pairs every site with itself
    assert_eq!(pair_set(&rb, 4), vec![(0, 0), (1, 1)]);
    // kernel index (2, 2) reads one step down-right: output (0,0,0) <- input (0,1,1)
    assert_eq!(pair_set(&rb, 8), vec![(1, 0)]);
    // kernel index (0, 0) reads one step up-left: output (0,1,1) <- input (0,0,0)
    assert_eq!(pair_set(&rb, 0), vec![(0, 1)]);
    for offset in [1, 2, 3, 5, 6, 7] {
        assert!(rb.pairs(offset).is_empty(), "offset {} should be empty", offset);
    }
    assert_eq!(rb.total_pairs(), 4);
}

#[test]
fn test_submanifold_center_offset_is_identity() {
    let client = create_cpu_client();
    let mut rng = seeded_rng(21);
    let x = random_sparse(&mut rng, 2, &[7, 7, 7], 1, 0.1);
    let geometry = ConvGeometry::submanifold(3, 3);
    let rb = build_rulebook(&client, x.sites(), &geometry, ConvMode::Submanifold).unwrap();

    let center = geometry.kernel_volume() / 2;
    let expected: Vec<(usize, usize)> = (0..x.num_active()).map(|i| (i, i)).collect();
    assert_eq!(pair_set(&rb, center), expected);
    rb.validate().unwrap();
}

#[test]
fn test_submanifold_pairs_are_symmetric() {
    let client = create_cpu_client();
    let mut rng = seeded_rng(22);
    let x = random_sparse(&mut rng, 1, &[9, 9], 1, 0.3);
    let geometry = ConvGeometry::submanifold(2, 3);
    let rb = build_rulebook(&client, x.sites(), &geometry, ConvMode::Submanifold).unwrap();

    // offset k and its mirror kv - 1 - k hold the same pairs with roles swapped
    let kv = geometry.kernel_volume();
    for k in 0..kv {
        let mut forward: Vec<(usize, usize)> = pair_set(&rb, k);
        let mut mirrored: Vec<(usize, usize)> =
            pair_set(&rb, kv - 1 - k).into_iter().map(|(i, o)| (o, i)).collect();
        forward.sort_unstable();
        mirrored.sort_unstable();
        assert_eq!(forward, mirrored, "offset {}", k);
    }
}

// =============================================================================
// Regular And Transposed
// =============================================================================

#[test]
fn test_regular_output_sites_in_discovery_order() {
    let client = create_cpu_client();
    // 1d, kernel 2, stride 2: 5 -> 2, 1 -> 0, 4 -> 2, 0 -> 0
    let input = sites(vec![0, 5, 0, 1, 0, 4, 0, 0], &[8], 1);
    let geometry = ConvGeometry::uniform(1, 2, 2, 0, 1);
    let rb = build_rulebook(&client, &input, &geometry, ConvMode::Regular).unwrap();

    assert_eq!(rb.output_sites().as_slice(), &[0, 2, 0, 0]);
    assert_eq!(rb.output_sites().spatial_shape().as_slice(), &[4]);
    assert_eq!(pair_set(&rb, 0), vec![(2, 0), (3, 1)]);
    assert_eq!(pair_set(&rb, 1), vec![(0, 0), (1, 1)]);
}

#[test]
fn test_every_regular_pair_satisfies_geometry() {
    let client = create_cpu_client();
    let mut rng = seeded_rng(23);
    let x = random_sparse(&mut rng, 2, &[9, 8], 1, 0.3);
    let geometry = ConvGeometry::new(&[3, 2], &[2, 1], &[1, 0], &[1, 2]);
    let rb = build_rulebook(&client, x.sites(), &geometry, ConvMode::Regular).unwrap();
    let out = rb.output_sites();

    let kernel = geometry.kernel_indices();
    for (k, kidx) in kernel.iter().enumerate() {
        for (i, o) in rb.pairs(k).iter() {
            let (ic, oc) = (x.sites().coord(i), out.coord(o));
            assert_eq!(ic[0], oc[0]);
            for d in 0..2 {
                let expected = oc[d + 1] as i64 * geometry.stride[d] as i64
                    - geometry.padding[d] as i64
                    + (kidx[d] * geometry.dilation[d]) as i64;
                assert_eq!(ic[d + 1] as i64, expected);
            }
        }
    }

    // every output site is reached by at least one pair
    let reached: HashSet<usize> = (0..rb.num_offsets())
        .flat_map(|k| rb.pairs(k).output().iter().map(|&o| o as usize).collect::<Vec<_>>())
        .collect();
    assert_eq!(reached.len(), out.len());
}

#[test]
fn test_transposed_covers_downsampled_origin() {
    let client = create_cpu_client();
    let mut rng = seeded_rng(24);
    let x = random_sparse(&mut rng, 1, &[8, 8], 1, 0.2);
    let geometry = ConvGeometry::uniform(2, 2, 2, 0, 1);
    let down = build_rulebook(&client, x.sites(), &geometry, ConvMode::Regular).unwrap();
    let up = build_rulebook(&client, down.output_sites(), &geometry, ConvMode::Transposed).unwrap();

    assert_eq!(up.output_sites().spatial_shape().as_slice(), &[8, 8]);
    // 2x2 stride 2 upsampling fills every child cell of each coarse site
    assert_eq!(up.output_sites().len(), down.output_sites().len() * 4);
    for coord in x.sites().iter() {
        let found = up.output_sites().iter().any(|c| c == coord);
        assert!(found, "{:?} missing from upsampled sites", coord);
    }
}

// =============================================================================
// Batch Isolation And Determinism
// =============================================================================

#[test]
fn test_batches_never_pair_across() {
    let client = create_cpu_client();
    // identical spatial pattern in both batches
    let input = sites(vec![0, 1, 1, 0, 2, 2, 1, 1, 1, 1, 2, 2], &[4, 4], 2);
    let geometry = ConvGeometry::uniform(2, 3, 2, 1, 1);
    let rb = build_rulebook(&client, &input, &geometry, ConvMode::Regular).unwrap();
    let out = rb.output_sites();

    for k in 0..rb.num_offsets() {
        for (i, o) in rb.pairs(k).iter() {
            assert_eq!(input.coord(i)[0], out.coord(o)[0]);
        }
    }
    let per_batch = |b: i32| out.iter().filter(|c| c[0] == b).count();
    assert_eq!(per_batch(0), per_batch(1));
}

#[test]
fn test_rulebook_identical_across_policies_and_threads() {
    let mut rng = seeded_rng(25);
    let x = random_sparse(&mut rng, 3, &[16, 16, 16], 1, 0.05);
    let geometry = ConvGeometry::uniform(3, 3, 2, 1, 1);

    let reference =
        build_rulebook(&create_sequential_client(), x.sites(), &geometry, ConvMode::Regular).unwrap();
    let clients = [
        create_threaded_client(2),
        create_threaded_client(8),
        create_cpu_client().with_grid_policy(GridPolicy::Hash),
        create_threaded_client(4).with_grid_policy(GridPolicy::Dense),
    ];
    for client in &clients {
        let rb = build_rulebook(client, x.sites(), &geometry, ConvMode::Regular).unwrap();
        assert_eq!(rb, reference);
    }

    let subm = ConvGeometry::submanifold(3, 3);
    let a = build_rulebook(&clients[0], x.sites(), &subm, ConvMode::Submanifold).unwrap();
    let b = build_rulebook(&clients[2], x.sites(), &subm, ConvMode::Submanifold).unwrap();
    assert_eq!(a, b);
}

// =============================================================================
// Inversion
// =============================================================================

#[test]
fn test_invert_swaps_roles() {
    let client = create_cpu_client();
    let mut rng = seeded_rng(26);
    let x = random_sparse(&mut rng, 1, &[10, 10], 1, 0.2);
    let geometry = ConvGeometry::uniform(2, 3, 2, 1, 1);
    let forward = build_rulebook(&client, x.sites(), &geometry, ConvMode::Regular).unwrap();
    let inverse = invert_rulebook(&forward).unwrap();

    assert_eq!(inverse.mode(), ConvMode::Inverse);
    assert!(Arc::ptr_eq(inverse.output_sites(), x.sites()));
    assert!(Arc::ptr_eq(inverse.input_sites(), forward.output_sites()));
    assert_eq!(inverse.pair_counts(), forward.pair_counts());
    for k in 0..forward.num_offsets() {
        assert_eq!(inverse.pairs(k).input(), forward.pairs(k).output());
        assert_eq!(inverse.pairs(k).output(), forward.pairs(k).input());
    }

    assert!(invert_rulebook(&inverse).is_err());
}

#[test]
fn test_inverse_mode_is_not_buildable() {
    let client = create_cpu_client();
    let input = sites(vec![0, 1], &[4], 1);
    let geometry = ConvGeometry::uniform(1, 2, 2, 0, 1);
    let err = build_rulebook(&client, &input, &geometry, ConvMode::Inverse).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { .. }));
}

#[test]
fn test_empty_input_builds_empty_rulebook() {
    let client = create_cpu_client();
    let input = Arc::new(CoordinateSet::empty([8, 8], 1).unwrap());
    let geometry = ConvGeometry::uniform(2, 3, 2, 1, 1);
    let rb = build_rulebook(&client, &input, &geometry, ConvMode::Regular).unwrap();
    assert_eq!(rb.output_sites().len(), 0);
    assert_eq!(rb.total_pairs(), 0);
    assert_eq!(rb.num_offsets(), 9);
}
