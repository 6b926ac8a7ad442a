//! Inline allocation sequences.
//!
//! An [`AllocationBuilder`] emits one `Allocate` inside a
//! `BeginRegion`/`FinishRegion` pair and threads every initializing store
//! through a single effect chain:
//!
//! ```text
//! effect -> BeginRegion -> Allocate -> StoreField(map) -> StoreField -> ... -> FinishRegion
//! ```
//!
//! so that no store can be reordered before the allocation or past another
//! store of the same object. The builder also picks the write barrier of
//! each store: the map store keeps the map barrier, and every other store
//! into a young allocation skips the barrier. Old-generation allocations
//! keep the barrier of the access.

use crate::diagnostics::{Diagnostics, Violation};
use crate::heap::layout;
use crate::heap::ObjectRef;
use crate::ir::operators::PretenureFlag;
use crate::ir::{
    ElementAccess, FieldAccess, Graph, NodeId, Operator, Type, TypeBits, WriteBarrierKind,
};

use super::access::AccessBuilder;

/// Builder for one inline allocation and its initializing stores.
pub struct AllocationBuilder<'g> {
    graph: &'g mut Graph,
    allocation: NodeId,
    effect: NodeId,
    control: NodeId,
    pretenure: PretenureFlag,
    size_check: Option<(&'g dyn Diagnostics, u32)>,
}

impl<'g> AllocationBuilder<'g> {
    pub fn new(graph: &'g mut Graph, effect: NodeId, control: NodeId) -> Self {
        AllocationBuilder {
            graph,
            allocation: NodeId::INVALID,
            effect,
            control,
            pretenure: PretenureFlag::NotTenured,
            size_check: None,
        }
    }

    /// Report allocations larger than `limit` bytes to `diagnostics`.
    pub fn with_size_limit(mut self, diagnostics: &'g dyn Diagnostics, limit: u32) -> Self {
        self.size_check = Some((diagnostics, limit));
        self
    }

    #[inline]
    pub fn graph(&mut self) -> &mut Graph {
        self.graph
    }

    /// The `Allocate` node; `NodeId::INVALID` before `allocate`.
    #[inline]
    pub fn allocation(&self) -> NodeId {
        self.allocation
    }

    /// Current end of the effect chain.
    #[inline]
    pub fn effect(&self) -> NodeId {
        self.effect
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Open a region and allocate `size` bytes typed `ty`.
    pub fn allocate(&mut self, size: u32, pretenure: PretenureFlag, ty: Type) {
        if let Some((diagnostics, limit)) = self.size_check {
            if size > limit {
                diagnostics.report(Violation::AllocationTooLarge { size, limit });
            }
        }
        self.pretenure = pretenure;
        let region = self.graph.add_node(Operator::BeginRegion, &[self.effect]);
        let size = self.graph.int32_constant(size as i32);
        let allocation = self.graph.add_node_with_type(
            Operator::Allocate(pretenure),
            &[size, region, self.control],
            ty,
        );
        log::trace!("inline allocation {} ({:?})", allocation, pretenure);
        self.allocation = allocation;
        self.effect = allocation;
    }

    /// Allocate a tagged backing store of `length` slots with `map` and
    /// store its header.
    pub fn allocate_fixed_array(&mut self, length: u32, map: ObjectRef, pretenure: PretenureFlag) {
        self.allocate(
            layout::fixed_array_size(length),
            pretenure,
            Type::from_bits(TypeBits::OTHER_INTERNAL),
        );
        self.store_constant(AccessBuilder::for_map(), map);
        self.store_smi(AccessBuilder::for_fixed_array_length(), length as i32);
    }

    /// Allocate an unboxed double backing store of `length` elements.
    pub fn allocate_double_array(&mut self, length: u32, map: ObjectRef, pretenure: PretenureFlag) {
        self.allocate(
            layout::fixed_double_array_size(length),
            pretenure,
            Type::from_bits(TypeBits::OTHER_INTERNAL),
        );
        self.store_constant(AccessBuilder::for_map(), map);
        self.store_smi(AccessBuilder::for_fixed_array_length(), length as i32);
    }

    // =========================================================================
    // Stores
    // =========================================================================

    fn write_barrier(&self, requested: WriteBarrierKind) -> WriteBarrierKind {
        match (requested, self.pretenure) {
            (WriteBarrierKind::Map, _) => WriteBarrierKind::Map,
            (_, PretenureFlag::NotTenured) => WriteBarrierKind::None,
            (requested, PretenureFlag::Tenured) => requested,
        }
    }

    pub fn store_field(&mut self, access: FieldAccess, value: NodeId) {
        let access = FieldAccess {
            write_barrier: self.write_barrier(access.write_barrier),
            ..access
        };
        let object = self.allocation;
        debug_assert!(object.is_valid(), "store before allocate");
        self.effect = self.graph.add_node(
            Operator::StoreField(access),
            &[object, value, self.effect, self.control],
        );
    }

    pub fn store_element(&mut self, access: ElementAccess, index: u32, value: NodeId) {
        let access = ElementAccess {
            write_barrier: self.write_barrier(access.write_barrier),
            ..access
        };
        let object = self.allocation;
        debug_assert!(object.is_valid(), "store before allocate");
        let index = self.graph.number_constant(index as f64);
        self.effect = self.graph.add_node(
            Operator::StoreElement(access),
            &[object, index, value, self.effect, self.control],
        );
    }

    pub fn store_constant(&mut self, access: FieldAccess, object: ObjectRef) {
        let value = self.graph.heap_constant(object);
        self.store_field(access, value);
    }

    pub fn store_smi(&mut self, access: FieldAccess, value: i32) {
        let value = self.graph.number_constant(value as f64);
        self.store_field(access, value);
    }

    // =========================================================================
    // Finishing
    // =========================================================================

    /// Close the region. The returned node is both the object and the new
    /// effect.
    pub fn finish(self) -> NodeId {
        let allocation = self.allocation;
        let ty = self.graph.ty(allocation);
        self.graph
            .add_node_with_type(Operator::FinishRegion, &[allocation, self.effect], ty)
    }

    /// Turn `node` into the `FinishRegion` of this allocation.
    ///
    /// The caller moves `node`'s control uses away first
    /// (`Graph::relax_controls`); value and effect uses stay on `node`.
    pub fn finish_and_change(self, node: NodeId) {
        let allocation = self.allocation;
        let node_type = self.graph.ty(node);
        if node_type.bits() == TypeBits::ANY {
            let ty = self.graph.ty(allocation);
            self.graph.set_type(node, ty);
        } else {
            self.graph.set_type(allocation, node_type);
        }
        self.graph.replace_input(node, 0, allocation);
        self.graph.replace_input(node, 1, self.effect);
        self.graph.trim_input_count(node, 2);
        self.graph.change_op(node, Operator::FinishRegion);
    }
}
