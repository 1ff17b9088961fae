//! Benchmarks for retargeting and avatar updates

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use avatara_test::{animation_library, face_result, pose_result};
use avatara_visual::{Avatar, AvatarConfig, RetargetConfig, Retargeter, ARKIT_BLEND_SHAPES};

fn full_face() -> avatara_tracking::FaceResult {
    let shapes: Vec<(&str, f32)> = ARKIT_BLEND_SHAPES
        .iter()
        .enumerate()
        .map(|(i, name)| (*name, (i as f32 / ARKIT_BLEND_SHAPES.len() as f32)))
        .collect();
    face_result(&shapes, 0.3)
}

fn bench_morph_influence(c: &mut Criterion) {
    let retargeter = Retargeter::new(RetargetConfig::default());

    c.bench_function("morph_influence_blink", |b| {
        b.iter(|| black_box(retargeter.morph_influence(black_box("eyeBlinkLeft"), black_box(0.5))))
    });
}

fn bench_retarget_face(c: &mut Criterion) {
    let retargeter = Retargeter::new(RetargetConfig::default());
    let face = full_face();

    c.bench_function("retarget_face_52_shapes", |b| {
        b.iter(|| black_box(retargeter.retarget_face(black_box(&face))))
    });
}

fn bench_torso_rotation(c: &mut Criterion) {
    let retargeter = Retargeter::new(RetargetConfig::default());
    let pose = pose_result(0.08, 0.95);

    c.bench_function("torso_rotation", |b| {
        b.iter(|| black_box(retargeter.torso_rotation(black_box(&pose))))
    });
}

fn bench_avatar_frame(c: &mut Criterion) {
    let retargeter = Retargeter::new(RetargetConfig::default());
    let targets = retargeter.retarget_face(&full_face());
    let mut avatar = Avatar::new(AvatarConfig::default(), animation_library());

    c.bench_function("avatar_apply_and_advance", |b| {
        b.iter(|| {
            avatar.apply_retargeted(black_box(&targets), 0.3);
            avatar.advance(Duration::from_millis(16));
        })
    });
}

criterion_group!(
    benches,
    bench_morph_influence,
    bench_retarget_face,
    bench_torso_rotation,
    bench_avatar_frame,
);

criterion_main!(benches);
