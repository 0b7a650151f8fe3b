use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use log::{error, info, warn};
use roxmltree::{Document, Node};

use crate::camera::CameraState;
use crate::config::{FlyoverConfig, ShadowBias};
use crate::model::{Material, MaterialId, Mesh, Model};
use crate::obj::load_obj;
use crate::shapes;

/// Parsed scene: tunables, start camera, materials and object placements.
#[derive(Debug, Clone)]
pub struct Scene {
    pub config: FlyoverConfig,
    pub camera: CameraStart,
    /// Position of the fill light, `w = 0` for a direction.
    pub fill_light: Option<Vec4>,
    pub materials: Vec<Material>,
    pub objects: Vec<SceneObject>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraStart {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
}

impl Default for CameraStart {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 25.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
        }
    }
}

impl CameraStart {
    pub fn camera(&self) -> CameraState {
        CameraState::look_at(self.eye, self.target, self.up)
    }
}

/// One placed object. Its mesh may still be loading.
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: String,
    pub mesh: Arc<Mesh>,
    pub transform: Mat4,
    /// Radians per cycle-time unit the object circles the Y axis.
    pub orbit_rate: Option<f32>,
    pub collidable: bool,
    pub casts_shadow: bool,
    pub material: MaterialId,
}

impl SceneObject {
    pub fn transform_at(&self, cycle_time: f32) -> Mat4 {
        match self.orbit_rate {
            Some(rate) => Mat4::from_rotation_y(rate * cycle_time) * self.transform,
            None => self.transform,
        }
    }
}

impl Scene {
    /// Reads a scene file, requesting its meshes from `library`.
    pub fn load(path: &Path, library: &mut MeshLibrary) -> Result<Self> {
        let xml = fs::read_to_string(path)
            .with_context(|| format!("failed to read scene {}", path.display()))?;
        Self::from_xml(&xml, library).with_context(|| format!("in scene {}", path.display()))
    }

    /// Parses scene XML, requesting meshes from `library`.
    pub fn from_xml(xml: &str, library: &mut MeshLibrary) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();

        let mut config = FlyoverConfig::default();
        if let Some(settings) = child(&root, "settings") {
            apply_settings(&settings, &mut config)?;
        }

        let camera = match child(&root, "camera") {
            Some(node) => {
                let defaults = CameraStart::default();
                CameraStart {
                    eye: parse_vec3(optional_text(&node, "eye"), defaults.eye)?,
                    target: parse_vec3(optional_text(&node, "target"), defaults.target)?,
                    up: parse_vec3(optional_text(&node, "up"), defaults.up)?,
                }
            }
            None => CameraStart::default(),
        };

        let fill_light = match child(&root, "light") {
            Some(node) => {
                let position = parse_vec3(optional_text(&node, "position"), Vec3::ZERO)?;
                let directional = parse_bool(optional_text(&node, "directional"), false)?;
                Some(position.extend(if directional { 0.0 } else { 1.0 }))
            }
            None => None,
        };

        let mut materials = Vec::new();
        for node in root.children().filter(|n| n.has_tag_name("material")) {
            materials.push(parse_material(&node)?);
        }

        let mut objects = Vec::new();
        for node in root.children().filter(|n| n.has_tag_name("object")) {
            objects.push(parse_object(&node, &materials, library)?);
        }

        Ok(Self {
            config,
            camera,
            fill_light,
            materials,
            objects,
        })
    }

    /// Builds this frame's model list at cycle time `t`.
    pub fn models_at(&self, cycle_time: f32) -> Vec<Model> {
        self.objects
            .iter()
            .map(|object| Model {
                name: object.name.clone(),
                mesh: Arc::clone(&object.mesh),
                transform: object.transform_at(cycle_time),
                collidable: object.collidable,
                casts_shadow: object.casts_shadow,
                material: object.material,
            })
            .collect()
    }

    pub fn pending_meshes(&self) -> usize {
        self.objects
            .iter()
            .filter(|object| !object.mesh.is_ready())
            .count()
    }
}

/// Shares meshes between objects and loads OBJ files on background threads.
///
/// A file mesh is handed out pending and fulfilled by its loader. A mesh
/// whose file fails to load stays pending, so it is never drawn and never
/// collides.
#[derive(Debug)]
pub struct MeshLibrary {
    root: PathBuf,
    meshes: HashMap<String, Arc<Mesh>>,
    loaders: Vec<JoinHandle<()>>,
}

impl MeshLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            meshes: HashMap::new(),
            loaders: Vec::new(),
        }
    }

    /// Library rooted at the directory holding `scene_path`.
    pub fn for_scene(scene_path: &Path) -> Self {
        Self::new(asset_root(scene_path))
    }

    /// Returns the mesh named by `source`: a built-in shape or an `.obj` path.
    pub fn resolve(&mut self, source: &str) -> Result<Arc<Mesh>> {
        if let Some(mesh) = self.meshes.get(source) {
            return Ok(Arc::clone(mesh));
        }
        let mesh = if let Some(geometry) = shapes::builtin(source) {
            Arc::new(Mesh::ready(source, geometry))
        } else if source.to_ascii_lowercase().ends_with(".obj") {
            let mesh = Arc::new(Mesh::pending(source));
            let path = self.root.join(source);
            self.spawn_loader(Arc::clone(&mesh), path);
            mesh
        } else {
            bail!("unknown mesh '{source}': expected a built-in shape or an .obj file");
        };
        self.meshes.insert(source.to_string(), Arc::clone(&mesh));
        Ok(mesh)
    }

    fn spawn_loader(&mut self, mesh: Arc<Mesh>, path: PathBuf) {
        self.loaders.push(thread::spawn(move || match load_obj(&path) {
            Ok(geometry) => {
                info!(
                    "loaded mesh {} ({} vertices)",
                    mesh.name(),
                    geometry.vertices.len()
                );
                mesh.fulfill(geometry);
            }
            Err(err) => error!("failed to load mesh {}: {err:#}", mesh.name()),
        }));
    }

    /// Blocks until every loader started so far has finished.
    pub fn wait(&mut self) {
        for loader in self.loaders.drain(..) {
            if loader.join().is_err() {
                error!("mesh loader panicked");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

/// Directory that relative mesh and texture paths in a scene resolve against.
pub fn asset_root(scene_path: &Path) -> PathBuf {
    scene_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

fn parse_material(node: &Node<'_, '_>) -> Result<Material> {
    let defaults = Material::default();
    let name = required_text(node, "name")?;
    let material = Material {
        color: parse_color(optional_text(node, "color"), defaults.color)
            .with_context(|| format!("material '{name}'"))?,
        ambient: parse_f32(optional_text(node, "ambient"), defaults.ambient)?,
        diffusivity: parse_f32(optional_text(node, "diffusivity"), defaults.diffusivity)?,
        specularity: parse_f32(optional_text(node, "specularity"), defaults.specularity)?,
        smoothness: parse_f32(optional_text(node, "smoothness"), defaults.smoothness)?,
        texture: optional_text(node, "texture"),
        texture_scale: parse_vec2(optional_text(node, "texture-scale"), defaults.texture_scale)?,
        receives_shadows: parse_bool(
            optional_text(node, "receives-shadows"),
            defaults.receives_shadows,
        )?,
        sky: parse_bool(optional_text(node, "sky"), defaults.sky)?,
        name,
    };
    Ok(material)
}

fn parse_object(
    node: &Node<'_, '_>,
    materials: &[Material],
    library: &mut MeshLibrary,
) -> Result<SceneObject> {
    let name = required_text(node, "name")?;
    let source = required_text(node, "mesh").with_context(|| format!("object '{name}'"))?;
    let mesh = library
        .resolve(&source)
        .with_context(|| format!("object '{name}'"))?;

    let material = match optional_text(node, "material") {
        Some(material) => materials
            .iter()
            .position(|m| m.name == material)
            .map(MaterialId)
            .ok_or_else(|| anyhow!("object '{name}' uses unknown material '{material}'"))?,
        None => MaterialId::default(),
    };

    let position = parse_vec3(optional_text(node, "position"), Vec3::ZERO)?;
    let rotation = parse_vec3(optional_text(node, "rotation"), Vec3::ZERO)?;
    let scale = parse_vec3(optional_text(node, "scale"), Vec3::ONE)?;
    let rotation = Quat::from_rotation_z(rotation.z.to_radians())
        * Quat::from_rotation_y(rotation.y.to_radians())
        * Quat::from_rotation_x(rotation.x.to_radians());

    Ok(SceneObject {
        mesh,
        transform: Mat4::from_scale_rotation_translation(scale, rotation, position),
        orbit_rate: optional_text(node, "orbit")
            .map(|rate| parse_f32(Some(rate), 0.0))
            .transpose()?,
        collidable: parse_bool(optional_text(node, "collidable"), false)?,
        casts_shadow: parse_bool(optional_text(node, "casts-shadow"), false)?,
        material,
        name,
    })
}

fn apply_settings(node: &Node<'_, '_>, config: &mut FlyoverConfig) -> Result<()> {
    for setting in node.children().filter(Node::is_element) {
        let tag = setting.tag_name().name();
        let text = setting.text().map(str::trim).unwrap_or_default();
        let number = || {
            text.parse::<f32>()
                .with_context(|| format!("setting <{tag}> expects a number, got '{text}'"))
        };
        match tag {
            "floor-height" => config.collision.floor_height = number()?,
            "look-ahead" => config.collision.look_ahead = number()?,
            "avoidance-radius" => config.collision.avoidance_radius = number()?,
            "radians-per-frame" => config.motion.radians_per_frame = number()?,
            "meters-per-frame" => config.motion.meters_per_frame = number()?,
            "dead-zone" => config.motion.dead_zone = number()?,
            "roll-step" => config.motion.roll_step = number()?,
            "speed-step" => config.motion.speed_step = number()?,
            "shadow-map-size" => {
                config.shadow.map_size = text
                    .parse()
                    .with_context(|| format!("setting <{tag}> expects a texel count"))?
            }
            "shadow-extent" => config.shadow.extent = number()?,
            "shadow-near" => config.shadow.near = number()?,
            "shadow-far" => config.shadow.far = number()?,
            "shadow-bias" => config.shadow.bias = parse_bias(text)?,
            "day-period" => config.day_cycle.period = number()?,
            "time-scale" => config.day_cycle.time_scale = number()?,
            other => warn!("ignoring unknown setting <{other}>"),
        }
    }
    Ok(())
}

/// `constant <value>` or `normal <scale> <min>`.
fn parse_bias(text: &str) -> Result<ShadowBias> {
    let mut parts = text.split_whitespace();
    let kind = parts.next().unwrap_or_default();
    let numbers = parts
        .map(str::parse::<f32>)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid shadow bias '{text}'"))?;
    match (kind, numbers.as_slice()) {
        ("constant", []) => Ok(ShadowBias::CONSTANT_DEFAULT),
        ("constant", [value]) => Ok(ShadowBias::Constant { value: *value }),
        ("normal", []) => Ok(ShadowBias::default()),
        ("normal", [scale, min]) => Ok(ShadowBias::NormalScaled {
            scale: *scale,
            min: *min,
        }),
        _ => Err(anyhow!("invalid shadow bias '{text}'")),
    }
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_numbers<const N: usize>(value: &str, what: &str) -> Result<[f32; N]> {
    let numbers = value
        .split_whitespace()
        .map(str::parse::<f32>)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid {what} '{value}'"))?;
    numbers
        .try_into()
        .map_err(|_| anyhow!("{what} '{value}' needs {N} components"))
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(value) => parse_numbers::<3>(&value, "vector").map(Vec3::from_array),
        None => Ok(default),
    }
}

fn parse_vec2(value: Option<String>, default: Vec2) -> Result<Vec2> {
    match value {
        Some(value) => parse_numbers::<2>(&value, "vector").map(Vec2::from_array),
        None => Ok(default),
    }
}

/// `#rrggbb`, `#rrggbbaa` or three/four 0-255 components.
fn parse_color(value: Option<String>, default: Vec4) -> Result<Vec4> {
    let Some(value) = value else {
        return Ok(default);
    };
    if let Some(hex) = value.strip_prefix('#') {
        let channel = |i: usize| -> Result<f32> {
            let digits = hex
                .get(i * 2..i * 2 + 2)
                .ok_or_else(|| anyhow!("color '{value}' is too short"))?;
            Ok(u8::from_str_radix(digits, 16)
                .with_context(|| format!("invalid hex color '{value}'"))? as f32
                / 255.0)
        };
        if hex.len() != 6 && hex.len() != 8 {
            bail!("color '{value}' must have 6 or 8 hex digits");
        }
        let alpha = if hex.len() == 8 { channel(3)? } else { 1.0 };
        return Ok(Vec4::new(channel(0)?, channel(1)?, channel(2)?, alpha));
    }
    let rgb = match parse_numbers::<4>(&value, "color") {
        Ok(rgba) => Vec4::from_array(rgba),
        Err(_) => parse_numbers::<3>(&value, "color")
            .map(|rgb| Vec3::from_array(rgb).extend(255.0))?,
    };
    Ok(rgb / 255.0)
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float '{value}': {err}")),
        None => Ok(default),
    }
}

fn parse_bool(value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref() {
        None => Ok(default),
        Some("true" | "yes" | "1") => Ok(true),
        Some("false" | "no" | "0") => Ok(false),
        Some(other) => Err(anyhow!("expected true or false, got '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLE: &str = r##"
    <scene>
        <settings>
            <shadow-map-size>1024</shadow-map-size>
            <floor-height>-2</floor-height>
            <shadow-bias>constant 0.01</shadow-bias>
        </settings>
        <camera>
            <eye>0 5 20</eye>
        </camera>
        <light>
            <position>1 2 3</position>
        </light>
        <material>
            <name>ground</name>
            <color>#5e3614</color>
            <ambient>0.5</ambient>
        </material>
        <material>
            <name>cloud</name>
            <color>150 227 255</color>
            <receives-shadows>false</receives-shadows>
        </material>
        <object>
            <name>Block</name>
            <mesh>cube</mesh>
            <material>ground</material>
            <position>0 1 0</position>
            <scale>2 2 2</scale>
            <collidable>true</collidable>
            <casts-shadow>true</casts-shadow>
        </object>
        <object>
            <name>Cloud</name>
            <mesh>cube</mesh>
            <material>cloud</material>
            <position>0 5 3</position>
            <orbit>0.5</orbit>
        </object>
    </scene>
    "##;

    fn parse(xml: &str) -> Result<Scene> {
        Scene::from_xml(xml, &mut MeshLibrary::new("."))
    }

    #[test]
    fn parse_scene_populates_everything() {
        let scene = parse(SAMPLE).unwrap();
        assert_eq!(scene.config.shadow.map_size, 1024);
        assert_eq!(scene.config.collision.floor_height, -2.0);
        assert_eq!(scene.config.shadow.bias, ShadowBias::Constant { value: 0.01 });
        assert_eq!(scene.camera.eye, Vec3::new(0.0, 5.0, 20.0));
        assert_eq!(scene.camera.target, Vec3::ZERO);
        assert_eq!(scene.fill_light, Some(Vec4::new(1.0, 2.0, 3.0, 1.0)));
        assert_eq!(scene.materials.len(), 2);
        assert_relative_eq!(scene.materials[0].color.x, 94.0 / 255.0);
        assert!(!scene.materials[1].receives_shadows);

        let block = &scene.objects[0];
        assert!(block.collidable && block.casts_shadow);
        assert_eq!(block.material, MaterialId(0));
        assert_eq!(scene.objects[1].material, MaterialId(1));
        assert!(!scene.objects[1].collidable);
        assert!(Arc::ptr_eq(&block.mesh, &scene.objects[1].mesh));
        assert_eq!(scene.pending_meshes(), 0);
    }

    #[test]
    fn orbiting_objects_circle_the_y_axis() {
        let scene = parse(SAMPLE).unwrap();
        let start = scene.models_at(0.0);
        assert_eq!(start[1].transform.w_axis.truncate(), Vec3::new(0.0, 5.0, 3.0));

        let quarter = scene.models_at(std::f32::consts::PI);
        let moved = quarter[1].transform.w_axis.truncate();
        assert_relative_eq!(moved.x, 3.0, epsilon = 1e-5);
        assert_relative_eq!(moved.y, 5.0, epsilon = 1e-5);
        assert_relative_eq!(moved.z, 0.0, epsilon = 1e-5);
        assert_eq!(quarter[0].transform, start[0].transform);
    }

    #[test]
    fn obj_meshes_load_in_the_background() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tri.obj"), "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        let mut library = MeshLibrary::new(dir.path());
        let first = library.resolve("tri.obj").unwrap();
        let second = library.resolve("tri.obj").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        library.wait();
        assert!(first.is_ready());
    }

    #[test]
    fn broken_obj_stays_pending() {
        let mut library = MeshLibrary::new("does/not/exist");
        let mesh = library.resolve("mountain.obj").unwrap();
        library.wait();
        assert!(!mesh.is_ready());
    }

    #[test]
    fn unknown_material_is_an_error() {
        let xml = "<scene><object><name>A</name><mesh>cube</mesh><material>x</material></object></scene>";
        let err = parse(xml).unwrap_err();
        assert!(format!("{err:#}").contains("unknown material"));
    }

    #[test]
    fn unknown_mesh_is_an_error() {
        let xml = "<scene><object><name>A</name><mesh>teapot</mesh></object></scene>";
        assert!(parse(xml).is_err());
    }

    #[test]
    fn missing_name_is_an_error() {
        assert!(parse("<scene><object><mesh>cube</mesh></object></scene>").is_err());
    }

    #[test]
    fn bias_settings_parse() {
        assert_eq!(parse_bias("constant").unwrap(), ShadowBias::CONSTANT_DEFAULT);
        assert_eq!(
            parse_bias("normal 0.1 0.02").unwrap(),
            ShadowBias::NormalScaled {
                scale: 0.1,
                min: 0.02
            }
        );
        assert!(parse_bias("normal 0.1").is_err());
    }
}
