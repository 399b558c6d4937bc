use crate::math::Vec2;
use crate::pool::{Keyed, PoolPolicy, TickContext};

/// Builds and positions terrain tile meshes. Geometry itself lives with
/// the renderer; the pool only moves meshes around.
pub trait ZoneMaterializer {
    type Mesh;

    fn create(&mut self) -> Self::Mesh;

    /// Moves `mesh` so it covers the tile whose corner is `origin`.
    fn place(&mut self, mesh: &mut Self::Mesh, origin: Vec2);
}

/// Grid coordinates of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoneCell {
    pub x: i32,
    pub z: i32,
}

impl Keyed for ZoneCell {
    type Key = ZoneCell;

    fn key(&self) -> ZoneCell {
        *self
    }
}

/// A loaded tile and the mesh covering it.
#[derive(Debug)]
pub struct Zone<M> {
    pub cell: ZoneCell,
    pub mesh: M,
}

impl<M> Keyed for Zone<M> {
    type Key = ZoneCell;

    fn key(&self) -> ZoneCell {
        self.cell
    }
}

/// Keeps a square block of `2 * span` tiles per side, snapped to the grid
/// around the observer. Meshes of tiles that fall out are reused for tiles
/// that come in.
pub struct ZonePolicy<Z: ZoneMaterializer> {
    materializer: Z,
    side: f32,
    span: i32,
    created: usize,
}

impl<Z: ZoneMaterializer> ZonePolicy<Z> {
    pub fn new(materializer: Z, side: f32, span: u32) -> Self {
        Self {
            materializer,
            side,
            span: span as i32,
            created: 0,
        }
    }

    pub fn materializer(&self) -> &Z {
        &self.materializer
    }

    /// Meshes created so far (recycled ones are not counted again).
    pub fn meshes_created(&self) -> usize {
        self.created
    }

    pub fn origin(&self, cell: ZoneCell) -> Vec2 {
        Vec2::new(cell.x as f32 * self.side, cell.z as f32 * self.side)
    }
}

impl<Z: ZoneMaterializer> PoolPolicy for ZonePolicy<Z> {
    type Candidate = ZoneCell;
    type Resource = Zone<Z::Mesh>;

    fn generate(&mut self, ctx: &TickContext) -> Vec<ZoneCell> {
        if self.side <= 0.0 {
            return Vec::new();
        }
        let snap_x = (ctx.observer.x / self.side).round() as i32;
        let snap_z = (ctx.observer.y / self.side).round() as i32;
        let mut cells = Vec::with_capacity((4 * self.span * self.span).max(0) as usize);
        for dx in -self.span..self.span {
            for dz in -self.span..self.span {
                cells.push(ZoneCell {
                    x: snap_x + dx,
                    z: snap_z + dz,
                });
            }
        }
        cells
    }

    fn add(
        &mut self,
        cell: ZoneCell,
        recycling: Option<Zone<Z::Mesh>>,
        _ctx: &TickContext,
    ) -> Zone<Z::Mesh> {
        let mut mesh = match recycling {
            Some(zone) => zone.mesh,
            None => {
                self.created += 1;
                self.materializer.create()
            }
        };
        let origin = self.origin(cell);
        self.materializer.place(&mut mesh, origin);
        Zone { cell, mesh }
    }

    fn remove(&mut self, _zone: &mut Zone<Z::Mesh>) {
        // The mesh stays on the dead stack for reuse.
    }
}
