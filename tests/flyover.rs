use std::path::Path;

use approx::assert_relative_eq;
use glam::{Mat4, Vec3, Vec4};
use mountain_flyover::shadow::{light_space_matrix, shadow_coord, shadow_transform, shadow_visibility};
use mountain_flyover::{
    Action, CameraPreset, Collision, DayCycle, DayCycleConfig, Flyover, LightDescriptor,
    MeshLibrary, Scene, ShadowBias, ShadowConfig,
};

const MEADOW: &str = r#"<scene>
  <settings>
    <shadow-bias>constant 0.005</shadow-bias>
  </settings>
  <camera>
    <eye>0 5 25</eye>
    <target>0 5 0</target>
  </camera>
  <object>
    <name>Ground</name>
    <mesh>square</mesh>
    <position>0 -0.85 0</position>
    <rotation>-90 0 0</rotation>
    <scale>100 100 100</scale>
    <collidable>true</collidable>
  </object>
  <object>
    <name>Rock</name>
    <mesh>cube</mesh>
    <collidable>true</collidable>
    <casts-shadow>true</casts-shadow>
  </object>
</scene>
"#;

fn flyover_from(xml: &str) -> Flyover {
    let scene = Scene::from_xml(xml, &mut MeshLibrary::new(".")).unwrap();
    let config = scene.config.clone();
    Flyover::new(scene, &config)
}

fn meadow() -> Flyover {
    flyover_from(MEADOW)
}

fn mountain_scene() -> Scene {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenes/mountain.xml");
    let mut library = MeshLibrary::for_scene(&path);
    Scene::load(&path, &mut library).unwrap()
}

#[test]
fn mountain_scene_can_be_flown_from_its_start() {
    let scene = mountain_scene();
    let config = scene.config.clone();
    let mut flyover = Flyover::new(scene, &config);
    let start = flyover.camera().position();

    flyover.action(Action::Forward, true);
    for _ in 0..60 {
        flyover.step(1.0 / 60.0);
    }
    let end = flyover.camera().position();
    assert_eq!(flyover.blocked_frames(), 0);
    assert!(end.z < start.z - 5.0, "camera stayed near {end}");
    assert_relative_eq!(end.y, start.y, epsilon = 1e-4);
}

#[test]
fn mountain_scene_has_an_unlit_sky_dome() {
    let scene = mountain_scene();
    let sky = scene
        .objects
        .iter()
        .find(|object| object.name == "Sky")
        .unwrap();
    assert_eq!(sky.mesh.name(), "skybox");
    assert!(sky.mesh.is_ready());
    assert!(!sky.collidable);
    assert!(!sky.casts_shadow);
    let material = &scene.materials[sky.material.0];
    assert!(material.sky);
    assert!(material.texture.is_some());
    assert_eq!(scene.objects.iter().filter(|o| o.orbit_rate.is_some()).count(), 7);
}

#[test]
fn descending_flight_stops_above_the_ground() {
    let mut flyover = meadow();
    assert!(flyover.action(Action::Down, true));
    let mut blocked = Vec::new();
    for _ in 0..120 {
        if let Some(collision) = flyover.step(1.0 / 60.0).motion.blocked {
            blocked.push(collision);
        }
    }
    // The ground sits at -0.85 and hits within 2.5 of the camera block the move.
    let y = flyover.camera().position().y;
    assert!(y > 1.45 && y <= 1.66, "unexpected resting height {y}");
    assert!(!blocked.is_empty());
    assert!(matches!(blocked[0], Collision::Ray { model: 0, .. }));
    assert_eq!(flyover.blocked_frames(), blocked.len() as u64);
}

#[test]
fn without_ground_geometry_the_floor_still_holds() {
    let xml = MEADOW.replacen(
        "<collidable>true</collidable>",
        "<collidable>false</collidable>",
        1,
    );
    let mut flyover = flyover_from(&xml);
    flyover.action(Action::Down, true);
    let first = (0..120)
        .filter_map(|_| flyover.step(1.0 / 60.0).motion.blocked)
        .next();
    assert_eq!(first, Some(Collision::Floor));
    let y = flyover.camera().position().y;
    assert!(y >= -0.8 && y < -0.6, "unexpected resting height {y}");
}

#[test]
fn presets_and_reset_move_the_camera() {
    let mut flyover = meadow();
    flyover.action(Action::Preset(CameraPreset::Rear), true);
    assert_relative_eq!(flyover.camera().position().z, -10.0, epsilon = 1e-5);

    flyover.action(Action::ResetToOrigin, true);
    assert_eq!(flyover.camera().position(), Vec3::ZERO);
    assert!(flyover.camera().is_consistent(1e-5));
}

#[test]
fn releasing_thrust_stops_the_camera() {
    let mut flyover = meadow();
    flyover.action(Action::Left, true);
    flyover.step(0.1);
    flyover.action(Action::Left, false);
    let before = flyover.camera().position();
    let frame = flyover.step(0.1);
    assert!(!frame.motion.translated);
    assert_eq!(flyover.camera().position(), before);
    assert!(before.x < 0.0);
}

#[test]
fn day_cycle_lighting_repeats() {
    let cycle = DayCycle::new(DayCycleConfig::default());
    // One period of 20 cycle units at half speed is 40 seconds.
    for elapsed in [0.0, 7.5, 13.0, 31.25] {
        let a = cycle.frame(elapsed);
        let b = cycle.frame(elapsed + 40.0);
        assert_relative_eq!(a.intensity(), b.intensity(), epsilon = 1e-4);
        assert!(a.sky_color.abs_diff_eq(b.sky_color, 1e-4));
        assert!(a
            .shadow_light()
            .position
            .abs_diff_eq(b.shadow_light().position, 1e-3));
    }
}

#[test]
fn rock_shadows_the_ground_under_an_overhead_light() {
    let config = ShadowConfig {
        bias: ShadowBias::CONSTANT_DEFAULT,
        ..ShadowConfig::default()
    };
    let light = LightDescriptor::new(Vec4::new(0.0, 20.0, 0.0, 1.0), Vec4::ONE, 1.0);
    let light_space = light_space_matrix(&light, &config);

    let rock_top = shadow_coord(shadow_transform(light_space, Mat4::IDENTITY), Vec3::Y * 0.5);
    let ground = shadow_coord(
        shadow_transform(light_space, Mat4::from_translation(Vec3::Y * -0.85)),
        Vec3::ZERO,
    );
    assert_relative_eq!(rock_top.x, ground.x, epsilon = 1e-5);
    assert_relative_eq!(rock_top.y, ground.y, epsilon = 1e-5);
    assert!(rock_top.z < ground.z);

    let bias = config.bias.value(Vec3::Y, Vec3::Y);
    let strength = 0.3;
    assert_eq!(shadow_visibility(ground, rock_top.z, bias, strength), strength);
    assert_eq!(shadow_visibility(rock_top, rock_top.z, bias, strength), 1.0);

    let far_away = shadow_coord(light_space_shifted(light_space, 50.0), Vec3::ZERO);
    assert_eq!(shadow_visibility(far_away, 0.0, bias, strength), 1.0);
}

fn light_space_shifted(light_space: Mat4, x: f32) -> Mat4 {
    shadow_transform(light_space, Mat4::from_translation(Vec3::X * x))
}
