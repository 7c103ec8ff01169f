// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Opcodes and parameters stored in a [crate::batch::Batch].

use bytemuck::{Pod, Zeroable};

/// One recorded operation.  Its operands live in the batch's parameter stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// `[Index(object)]`
    SetModelTransform,
    /// `[Index(transform)]`
    SetViewTransform,
    /// `[Index(transform)]`
    SetProjectionTransform,
    /// `[Index(data offset)]` of a `Vec4` in the data blob.
    SetViewportTransform,
    /// `[Float(near), Float(far)]`
    SetDepthRangeTransform,
    /// `[UInt(pipeline)]`
    SetPipeline,
    /// `[UInt(vertex count), UInt(first vertex)]`
    Draw,
    /// `[UInt(index count), UInt(first index)]`
    DrawIndexed,
    /// `[UInt(instances), UInt(vertex count), UInt(first vertex)]`
    DrawInstanced,
    /// `[UInt(instances), UInt(index count), UInt(first index)]`
    DrawIndexedInstanced,
}

impl Command {
    pub fn is_draw(self) -> bool {
        matches!(
            self,
            Command::Draw
                | Command::DrawIndexed
                | Command::DrawInstanced
                | Command::DrawIndexedInstanced
        )
    }

    /// Number of parameters the command consumes.
    pub fn param_count(self) -> usize {
        match self {
            Command::SetModelTransform
            | Command::SetViewTransform
            | Command::SetProjectionTransform
            | Command::SetViewportTransform
            | Command::SetPipeline => 1,
            Command::SetDepthRangeTransform | Command::Draw | Command::DrawIndexed => 2,
            Command::DrawInstanced | Command::DrawIndexedInstanced => 3,
        }
    }
}

/// A literal operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Param {
    UInt(u64),
    Float(f32),
    /// Index into one of the batch's side arrays, or a byte offset into its data blob.
    Index(usize),
}

impl Param {
    pub fn uint(self) -> Option<u64> {
        match self {
            Param::UInt(v) => Some(v),
            _ => None,
        }
    }

    pub fn float(self) -> Option<f32> {
        match self {
            Param::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn index(self) -> Option<usize> {
        match self {
            Param::Index(v) => Some(v),
            _ => None,
        }
    }
}

/// Opaque identity of a pipeline owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(pub u64);

/**
Per-draw record uploaded alongside the object transforms.

`object` indexes the object transform array; shaders read it to find their model matrix.
*/
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawCallInfo {
    pub object: u32,
}

/// A command together with its operands, as yielded by [crate::batch::Batch::commands].
#[derive(Debug, Clone, Copy)]
pub struct CommandRef<'a> {
    pub index: usize,
    pub command: Command,
    pub params: &'a [Param],
}

impl CommandRef<'_> {
    pub fn param(&self, i: usize) -> Option<Param> {
        self.params.get(i).copied()
    }
}
