//! BoneCast 磁盘缓存
//!
//! 文件格式（小端）：
//! - 魔数 "JBCD"，版本 u32
//! - 构建参数：weight_threshold / simplify_target / simplify_target_error (f32 ×3)
//! - 原始几何：顶点数 u32 + 顶点 + 权重，索引数 u32 + 索引
//! - 构建结果：顶点数 u32 + 顶点 + 权重，索引数 u32 + 索引
//!
//! 读失败 / 写失败都只记录在 last_error，调用方当作未命中处理。

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::Vec3;
use parking_lot::Mutex;

use crate::{JiggleError, Result};

use super::builder::BuildParams;
use super::geometry::{ColliderData, ColliderDataStorage};

const MAGIC: &[u8; 4] = b"JBCD";
const VERSION: u32 = 2;

/// 单个缓冲区的元素上限，防止损坏文件触发超大分配
const MAX_ELEMENTS: u32 = 1 << 24;

pub struct BoneCastIo {
    dir: PathBuf,
    last_error: Mutex<Option<String>>,
}

impl BoneCastIo {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), last_error: Mutex::new(None) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    fn record(&self, e: &JiggleError) {
        log::warn!("[BoneCast] {}", e);
        *self.last_error.lock() = Some(e.to_string());
    }

    /// 文件名：持久 ID（非字母数字替换为 '_'）+ 节点名十六进制
    pub fn make_key(persistent_id: &str, node: &str) -> String {
        let id: String = persistent_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let hex: String = node.bytes().map(|b| format!("{:02x}", b)).collect();
        format!("{}_{}.bin", id, hex)
    }

    fn path(&self, persistent_id: &str, node: &str) -> PathBuf {
        self.dir.join(Self::make_key(persistent_id, node))
    }

    /// 读取；文件不存在或参数不符返回 None（不算错误）
    pub fn read(
        &self,
        persistent_id: &str,
        node: &str,
        params: &BuildParams,
    ) -> Option<(ColliderDataStorage, ColliderData)> {
        let path = self.path(persistent_id, node);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                self.record(&JiggleError::Io(e));
                return None;
            }
        };

        match read_entry(&mut BufReader::new(file)) {
            Ok((stored, storage, data)) if stored == *params => Some((storage, data)),
            Ok(_) => {
                log::debug!("[BoneCast] 参数已过期: {}", path.display());
                None
            }
            Err(e) => {
                self.record(&e);
                None
            }
        }
    }

    /// 写入（先写临时文件再改名）
    pub fn write(&self, persistent_id: &str, node: &str, storage: &ColliderDataStorage, data: &ColliderData) -> bool {
        let path = self.path(persistent_id, node);
        let result = fs::create_dir_all(&self.dir)
            .map_err(JiggleError::from)
            .and_then(|_| {
                let tmp = path.with_extension("tmp");
                {
                    let mut w = BufWriter::new(File::create(&tmp)?);
                    write_entry(&mut w, storage, data)?;
                    w.flush()?;
                }
                fs::rename(&tmp, &path)?;
                Ok(())
            });

        match result {
            Ok(()) => true,
            Err(e) => {
                self.record(&e);
                false
            }
        }
    }

    /// 删除条目；文件本来不存在不算错误
    pub fn remove(&self, persistent_id: &str, node: &str) -> bool {
        match fs::remove_file(self.path(persistent_id, node)) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                self.record(&JiggleError::Io(e));
                false
            }
        }
    }
}

// ============================================================================
// 编解码
// ============================================================================

fn corrupt(what: &str, e: std::io::Error) -> JiggleError {
    JiggleError::CorruptCache(format!("Failed to read {}: {}", what, e))
}

pub(crate) fn read_entry<R: Read>(reader: &mut R) -> Result<(BuildParams, ColliderDataStorage, ColliderData)> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(|e| corrupt("magic", e))?;
    if &magic != MAGIC {
        return Err(JiggleError::CorruptCache("Invalid magic".to_string()));
    }
    let version = reader.read_u32::<LittleEndian>().map_err(|e| corrupt("version", e))?;
    if version != VERSION {
        return Err(JiggleError::CorruptCache(format!("Unsupported version {}", version)));
    }

    let params = BuildParams {
        weight_threshold: reader.read_f32::<LittleEndian>().map_err(|e| corrupt("params", e))?,
        simplify_target: reader.read_f32::<LittleEndian>().map_err(|e| corrupt("params", e))?,
        simplify_target_error: reader.read_f32::<LittleEndian>().map_err(|e| corrupt("params", e))?,
    };

    let vertex_count = read_count(reader, "storage vertex count")?;
    let vertices = read_vec3s(reader, vertex_count)?;
    let weights = read_weights(reader, vertex_count)?;
    let index_count = read_count(reader, "storage index count")?;
    let indices = read_indices(reader, index_count, vertex_count)?;
    let storage = ColliderDataStorage { vertices, indices, weights };

    let vertex_count = read_count(reader, "data vertex count")?;
    let vertices = read_vec3s(reader, vertex_count)?;
    let weights = read_weights(reader, vertex_count)?;
    let index_count = read_count(reader, "data index count")?;
    let indices = read_indices(reader, index_count, vertex_count)?;

    Ok((params, storage, ColliderData::with_weights(vertices, indices, weights, params)))
}

fn read_count<R: Read>(reader: &mut R, what: &str) -> Result<u32> {
    let n = reader.read_u32::<LittleEndian>().map_err(|e| corrupt(what, e))?;
    if n > MAX_ELEMENTS {
        return Err(JiggleError::CorruptCache(format!("{} too large: {}", what, n)));
    }
    Ok(n)
}

fn read_vec3s<R: Read>(reader: &mut R, count: u32) -> Result<Vec<Vec3>> {
    (0..count)
        .map(|_| {
            let x = reader.read_f32::<LittleEndian>().map_err(|e| corrupt("vertex", e))?;
            let y = reader.read_f32::<LittleEndian>().map_err(|e| corrupt("vertex", e))?;
            let z = reader.read_f32::<LittleEndian>().map_err(|e| corrupt("vertex", e))?;
            Ok(Vec3::new(x, y, z))
        })
        .collect()
}

fn read_weights<R: Read>(reader: &mut R, count: u32) -> Result<Vec<f32>> {
    (0..count)
        .map(|_| reader.read_f32::<LittleEndian>().map_err(|e| corrupt("weight", e)))
        .collect()
}

fn read_indices<R: Read>(reader: &mut R, count: u32, vertex_count: u32) -> Result<Vec<u32>> {
    if count % 3 != 0 {
        return Err(JiggleError::CorruptCache(format!("Index count {} not a multiple of 3", count)));
    }
    (0..count)
        .map(|_| {
            let i = reader.read_u32::<LittleEndian>().map_err(|e| corrupt("index", e))?;
            if i >= vertex_count {
                return Err(JiggleError::CorruptCache(format!("Index {} out of range", i)));
            }
            Ok(i)
        })
        .collect()
}

pub(crate) fn write_entry<W: Write>(writer: &mut W, storage: &ColliderDataStorage, data: &ColliderData) -> Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_u32::<LittleEndian>(VERSION)?;
    writer.write_f32::<LittleEndian>(data.params.weight_threshold)?;
    writer.write_f32::<LittleEndian>(data.params.simplify_target)?;
    writer.write_f32::<LittleEndian>(data.params.simplify_target_error)?;

    writer.write_u32::<LittleEndian>(storage.vertices.len() as u32)?;
    write_vec3s(writer, &storage.vertices)?;
    write_weights(writer, &storage.weights)?;
    writer.write_u32::<LittleEndian>(storage.indices.len() as u32)?;
    for &i in &storage.indices {
        writer.write_u32::<LittleEndian>(i)?;
    }

    writer.write_u32::<LittleEndian>(data.vertices.len() as u32)?;
    write_vec3s(writer, &data.vertices)?;
    write_weights(writer, &data.weights)?;
    writer.write_u32::<LittleEndian>(data.indices.len() as u32)?;
    for &i in &data.indices {
        writer.write_u32::<LittleEndian>(i)?;
    }
    Ok(())
}

fn write_vec3s<W: Write>(writer: &mut W, vertices: &[Vec3]) -> Result<()> {
    for v in vertices {
        writer.write_f32::<LittleEndian>(v.x)?;
        writer.write_f32::<LittleEndian>(v.y)?;
        writer.write_f32::<LittleEndian>(v.z)?;
    }
    Ok(())
}

fn write_weights<W: Write>(writer: &mut W, weights: &[f32]) -> Result<()> {
    for &w in weights {
        writer.write_f32::<LittleEndian>(w)?;
    }
    Ok(())
}
