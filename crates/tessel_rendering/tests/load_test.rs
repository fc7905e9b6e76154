//! Load batch behaviour through the public scene API.

use std::sync::Arc;
use std::time::Duration;

use glam::{Mat4, Vec3};
use tessel_core::{GpuDevice, HostDevice};
use tessel_rendering::assets::{write_asset, ASSET_FORMAT_VERSION};
use tessel_rendering::streaming::{terrain_chunk_name, TERRAIN_CHUNK_SIZE};
use tessel_rendering::{
    AssetData, AssetId, AssetKind, Bucket, FileAssetSource, InstanceId, InstanceTable, MemoryAssetSource,
    RenderConfig, RenderError, Scene,
};

fn config() -> RenderConfig {
    RenderConfig {
        worker_threads: 4,
        ..RenderConfig::default()
    }
}

fn scene_with(source: &Arc<MemoryAssetSource>) -> Scene {
    let device: Arc<dyn GpuDevice> = Arc::new(HostDevice::new());
    Scene::new(device, source.clone(), config()).unwrap()
}

fn at(x: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(x, 0.0, 0.0))
}

#[test]
fn test_duplicate_placements_share_one_asset() {
    let source = Arc::new(
        MemoryAssetSource::new()
            .with_asset("a", AssetData::cuboid(Vec3::ONE).with_parts(&[false, false, true]))
            .with_asset("b", AssetData::cuboid(Vec3::ONE)),
    );
    let mut scene = scene_with(&source);
    scene.register_load(AssetKind::Model, "a", at(0.0));
    scene.register_load(AssetKind::Model, "a", at(3.0));
    scene.register_load(AssetKind::Model, "b", at(6.0));

    let report = scene.execute_load().unwrap();

    assert_eq!(report.assets_loaded, 2);
    assert_eq!(report.instances_created, 3);
    assert_eq!(scene.loaded_asset_count(AssetKind::Model), 2);
    assert_eq!(scene.instance_count(AssetKind::Model), 3);
    // a: 2 opaque + 1 transparent, twice; b: 1 opaque.
    assert_eq!(scene.draw_call_count(AssetKind::Model, Bucket::Opaque), 5);
    assert_eq!(scene.draw_call_count(AssetKind::Model, Bucket::Transparent), 2);
    assert_eq!(report.draw_calls_created, 7);
    assert_eq!(source.load_count("a"), 1);
    assert_eq!(source.load_count("b"), 1);

    let table = scene.renderer(AssetKind::Model).core().table();
    let ids: Vec<u32> = table.with_records(|records| (0..records.len() as u32).collect());
    assert_eq!(ids, vec![0, 1, 2]);
}

#[test]
fn test_concurrent_placements_load_once() {
    let source = Arc::new(
        MemoryAssetSource::new()
            .with_asset("tree", AssetData::cuboid(Vec3::new(0.5, 3.0, 0.5)))
            .with_load_delay(Duration::from_millis(20)),
    );
    let mut scene = scene_with(&source);
    for i in 0..32 {
        scene.register_load(AssetKind::Model, "tree", at(i as f32 * 2.0));
    }

    let report = scene.execute_load().unwrap();

    assert_eq!(source.load_count("tree"), 1);
    assert_eq!(report.assets_loaded, 1);
    assert_eq!(report.instances_created, 32);
    let table = scene.renderer(AssetKind::Model).core().table();
    for index in 0..32 {
        let record = table.instance(InstanceId(index)).unwrap();
        assert_eq!(record.asset_id, AssetId(0));
    }
}

#[test]
fn test_missing_asset_fails_once_for_all_placements() {
    let source = Arc::new(MemoryAssetSource::new());
    let mut scene = scene_with(&source);
    for i in 0..5 {
        scene.register_load(AssetKind::Model, "ghost", at(i as f32));
    }

    let report = scene.execute_load().unwrap();

    assert_eq!(report.assets_failed, 1);
    assert_eq!(report.placements_skipped, 5);
    assert_eq!(scene.instance_count(AssetKind::Model), 0);
    assert_eq!(scene.draw_call_count(AssetKind::Model, Bucket::Opaque), 0);
    assert_eq!(scene.failed_asset_count(AssetKind::Model), 1);
    assert_eq!(source.load_count("ghost"), 1);

    // Later placements of the failed asset are skipped without another load.
    scene.register_load(AssetKind::Model, "ghost", at(0.0));
    scene.execute_load().unwrap();
    assert_eq!(source.load_count("ghost"), 1);
    assert_eq!(scene.instance_count(AssetKind::Model), 0);
}

#[test]
fn test_header_mismatch_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_asset(dir.path().join("good.tsas"), &AssetData::cuboid(Vec3::ONE)).unwrap();
    let mut stale = b"TSAS".to_vec();
    stale.extend_from_slice(&(ASSET_FORMAT_VERSION + 1).to_le_bytes());
    stale.extend_from_slice(&[0; 16]);
    std::fs::write(dir.path().join("stale.tsas"), stale).unwrap();

    let device: Arc<dyn GpuDevice> = Arc::new(HostDevice::new());
    let mut scene = Scene::new(device, Arc::new(FileAssetSource::new(dir.path())), config()).unwrap();

    scene.register_load(AssetKind::Terrain, "good.tsas", Mat4::IDENTITY);
    scene.register_load(AssetKind::Terrain, "missing.tsas", Mat4::IDENTITY);
    let report = scene.execute_load().unwrap();
    assert_eq!(report.assets_loaded, 1);
    assert_eq!(report.assets_failed, 1);

    scene.register_load(AssetKind::Terrain, "stale.tsas", Mat4::IDENTITY);
    match scene.execute_load() {
        Err(RenderError::AssetHeaderMismatch { asset, .. }) => assert_eq!(asset, "stale.tsas"),
        other => panic!("expected a header mismatch, got {other:?}"),
    }
}

#[test]
fn test_instance_ids_are_sequential_and_restart_after_clear() {
    let device: Arc<dyn GpuDevice> = Arc::new(HostDevice::new());
    let source = MemoryAssetSource::new().with_asset("crate", AssetData::cuboid(Vec3::ONE));
    let cache = tessel_rendering::AssetLoadCache::new(&device, AssetKind::Model, 1.25);
    let asset = cache.asset(cache.acquire("crate", &source).unwrap().id).unwrap();
    let table = InstanceTable::new(&device, AssetKind::Model);

    let ids: Vec<InstanceId> = (0..6)
        .map(|i| table.add_instance(&asset, at(i as f32)).unwrap())
        .collect();
    assert_eq!(ids, (0..6).map(InstanceId).collect::<Vec<_>>());

    table.clear();
    assert_eq!(table.add_instance(&asset, Mat4::IDENTITY).unwrap(), InstanceId(0));
}

#[test]
fn test_scene_clear_restarts_everything() {
    let source = Arc::new(MemoryAssetSource::new().with_asset("crate", AssetData::cuboid(Vec3::ONE)));
    let mut scene = scene_with(&source);
    scene.register_load(AssetKind::Model, "crate", at(0.0));
    scene.register_load(AssetKind::Model, "crate", at(2.0));
    scene.execute_load().unwrap();

    scene.clear();
    assert_eq!(scene.instance_count(AssetKind::Model), 0);
    assert_eq!(scene.draw_call_count(AssetKind::Model, Bucket::Opaque), 0);

    scene.register_load(AssetKind::Model, "crate", at(0.0));
    scene.execute_load().unwrap();
    assert_eq!(scene.instance_count(AssetKind::Model), 1);
    assert_eq!(source.load_count("crate"), 2);
    assert_eq!(scene.resolve_asset_for_draw_call(AssetKind::Model, 0, Bucket::Opaque), AssetId(0));
}

#[test]
fn test_composite_with_failed_decoration_renders_partially() {
    let source = Arc::new(
        MemoryAssetSource::new()
            .with_asset(
                "keep",
                AssetData::cuboid(Vec3::splat(4.0))
                    .with_decoration("torch", Mat4::from_translation(Vec3::Y * 5.0))
                    .with_decoration("broken_flag", Mat4::from_translation(Vec3::Y * 8.0)),
            )
            .with_asset("torch", AssetData::cuboid(Vec3::splat(0.25))),
    );
    let mut scene = scene_with(&source);
    scene.register_load(AssetKind::MapObject, "keep", Mat4::IDENTITY);

    let report = scene.execute_load().unwrap();

    assert_eq!(report.decorations_spawned, 2);
    assert_eq!(report.placements_skipped, 1);
    assert_eq!(scene.instance_count(AssetKind::MapObject), 1);
    assert_eq!(scene.instance_count(AssetKind::Model), 1);
    assert_eq!(scene.failed_asset_count(AssetKind::Model), 1);

    let torch = scene
        .renderer(AssetKind::Model)
        .core()
        .table()
        .instance(InstanceId(0))
        .unwrap();
    assert_eq!(torch.transform.transform_point3(Vec3::ZERO), Vec3::new(0.0, 5.0, 0.0));
}

#[test]
fn test_animated_models_get_bone_ranges() {
    let source = Arc::new(
        MemoryAssetSource::new()
            .with_asset("wolf", AssetData::cuboid(Vec3::ONE).with_bones(24))
            .with_asset("rock", AssetData::cuboid(Vec3::ONE)),
    );
    let mut scene = scene_with(&source);
    scene.register_load(AssetKind::Model, "wolf", at(0.0));
    scene.register_load(AssetKind::Model, "wolf", at(4.0));
    scene.register_load(AssetKind::Model, "rock", at(8.0));
    scene.execute_load().unwrap();

    let table = scene.renderer(AssetKind::Model).core().table();
    let mut deform_offsets: Vec<u64> = table.with_records(|records| {
        records
            .iter()
            .filter_map(|r| r.bones.as_ref().map(|b| b.deform.offset))
            .collect()
    });
    deform_offsets.sort_unstable();
    assert_eq!(deform_offsets.len(), 2);
    assert_ne!(deform_offsets[0], deform_offsets[1]);
}

#[test]
fn test_terrain_chunks_sit_on_their_grid_origin() {
    let half = Vec3::new(16.0, 1.0, 16.0);
    let source = Arc::new(
        MemoryAssetSource::new()
            .with_asset(terrain_chunk_name("vale", 2, -1), AssetData::cuboid(half))
            .with_asset(terrain_chunk_name("vale", 0, 0), AssetData::cuboid(half)),
    );
    let mut scene = scene_with(&source);
    scene.register_terrain_chunk("vale", 2, -1);
    assert_eq!(scene.pending_count(), 1);
    scene.execute_load().unwrap();
    scene.register_terrain_chunk("vale", 0, 0);
    scene.execute_load().unwrap();

    assert_eq!(scene.instance_count(AssetKind::Terrain), 2);
    let table = scene.renderer(AssetKind::Terrain).core().table();

    let far = table.instance(InstanceId(0)).unwrap();
    let origin = Vec3::new(2.0 * TERRAIN_CHUNK_SIZE, 0.0, -TERRAIN_CHUNK_SIZE);
    assert_eq!(origin, Vec3::new(64.0, 0.0, -32.0));
    assert_eq!(far.transform, Mat4::from_translation(origin));
    assert!((far.world_bounds.min - (origin - half)).length() < 1e-4);
    assert!((far.world_bounds.max - (origin + half)).length() < 1e-4);

    let home = table.instance(InstanceId(1)).unwrap();
    assert_eq!(home.transform, Mat4::IDENTITY);
    assert!((home.world_bounds.min + half).length() < 1e-4);
}
