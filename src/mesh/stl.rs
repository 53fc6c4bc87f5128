//! Binary STL reading and writing.
//!
//! The 84-byte header form: 80 ignored bytes, a little-endian u32 triangle
//! count, then 50-byte records of normal + three vertices (f32 each) and a
//! two-byte attribute word.

use std::io::{self, Read, Write};

use crate::geom::Vec3;

use super::{Mesh, Triangle};

fn read_vec3<R: Read>(r: &mut R) -> io::Result<Vec3<f64>> {
    let mut buf = [0u8; 12];
    r.read_exact(&mut buf)?;
    let x = f32::from_le_bytes(buf[0..4].try_into().expect("4 bytes"));
    let y = f32::from_le_bytes(buf[4..8].try_into().expect("4 bytes"));
    let z = f32::from_le_bytes(buf[8..12].try_into().expect("4 bytes"));
    Ok(Vec3::new(x as f64, y as f64, z as f64))
}

fn write_vec3<W: Write>(w: &mut W, v: Vec3<f64>) -> io::Result<()> {
    w.write_all(&(v.x as f32).to_le_bytes())?;
    w.write_all(&(v.y as f32).to_le_bytes())?;
    w.write_all(&(v.z as f32).to_le_bytes())
}

/// Read a binary STL file into a mesh.
pub fn read_stl<R: Read>(reader: &mut R) -> io::Result<Mesh> {
    let mut header = [0u8; 80];
    reader.read_exact(&mut header)?;
    let mut count_buf = [0u8; 4];
    reader.read_exact(&mut count_buf)?;
    let count = u32::from_le_bytes(count_buf);

    let mut triangles = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let _normal = read_vec3(reader)?;
        let a = read_vec3(reader)?;
        let b = read_vec3(reader)?;
        let c = read_vec3(reader)?;
        let mut attr = [0u8; 2];
        reader.read_exact(&mut attr)?;
        triangles.push(Triangle::new(a, b, c));
    }
    Ok(Mesh::new(triangles))
}

/// Write a mesh as binary STL.
pub fn write_stl<W: Write>(writer: &mut W, mesh: &Mesh) -> io::Result<()> {
    writer.write_all(&[0u8; 80])?;
    writer.write_all(&(mesh.triangles.len() as u32).to_le_bytes())?;
    for t in &mesh.triangles {
        write_vec3(writer, t.normal())?;
        for &v in &t.vertices {
            write_vec3(writer, v)?;
        }
        writer.write_all(&[0u8; 2])?;
    }
    Ok(())
}
