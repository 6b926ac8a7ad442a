//! Array, object and regexp literals.
//!
//! A literal with allocation site feedback is copied from its boilerplate.
//! The copy is only attempted when the whole boilerplate graph passes
//! [`CreateLowering::check_fast_literal`]: nesting at most
//! `max_fast_literal_depth` objects deep and holding at most
//! `max_fast_literal_properties` fields and elements in total. Any nested
//! object that fails either bound declines the outermost literal.

use smallvec::SmallVec;
use thiserror::Error;

use crate::heap::layout::{self, HOLE_NAN_BITS};
use crate::heap::{FieldRepresentation, HeapValue, MapData, ObjectData, ObjectRef, PropertyLocation};
use crate::ir::operators::{CreateLiteralParameters, PretenureFlag};
use crate::ir::{Graph, NodeId, Type, TypeBits};

use super::access::AccessBuilder;
use super::create::CreateLowering;
use super::Reduction;

/// Reason a boilerplate cannot be copied inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LiteralDecline {
    #[error("boilerplate map is deprecated")]
    DeprecatedMap,

    #[error("literal nests deeper than the fast literal depth")]
    TooDeep,

    #[error("literal has more fields and elements than the fast literal budget")]
    TooManyProperties,

    #[error("literal does not fit in a regular heap object")]
    TooLarge,

    #[error("boilerplate elements are not a fixed array")]
    UnsupportedElements,

    #[error("boilerplate keeps properties outside the object")]
    SlowProperties,

    #[error("boilerplate is missing from the heap snapshot")]
    MalformedBoilerplate,
}

/// Take one unit from the literal budget.
fn spend(budget: &mut u32) -> Result<(), LiteralDecline> {
    if *budget == 0 {
        return Err(LiteralDecline::TooManyProperties);
    }
    *budget -= 1;
    Ok(())
}

impl CreateLowering<'_> {
    // =========================================================================
    // Boilerplate Checks
    // =========================================================================

    /// Decide whether `boilerplate` and everything reachable from it can be
    /// copied inline. `depth` counts the object levels still allowed and
    /// `budget` the fields and elements still allowed across the literal.
    ///
    /// Everything [`allocate_fast_literal`](Self::allocate_fast_literal)
    /// reads is validated here.
    pub(super) fn check_fast_literal(
        &self,
        boilerplate: ObjectRef,
        depth: u32,
        budget: &mut u32,
    ) -> Result<(), LiteralDecline> {
        if depth == 0 {
            return Err(LiteralDecline::TooDeep);
        }
        let object = self
            .broker
            .js_object(boilerplate)
            .ok_or(LiteralDecline::MalformedBoilerplate)?;
        let map = self.broker.map(object.map).ok_or(LiteralDecline::MalformedBoilerplate)?;
        if map.is_deprecated {
            return Err(LiteralDecline::DeprecatedMap);
        }
        if !self.fits(map.instance_size) {
            return Err(LiteralDecline::TooLarge);
        }

        match self.broker.get(object.elements) {
            Some(ObjectData::FixedArray(elements)) => {
                let copied = !elements.values.is_empty()
                    && elements.map != self.broker.roots().fixed_cow_array_map;
                if copied {
                    if !self.fits(layout::fixed_array_size(elements.values.len() as u32)) {
                        return Err(LiteralDecline::TooLarge);
                    }
                    for value in elements.values.iter().flatten() {
                        spend(budget)?;
                        self.check_nested(*value, depth, budget)?;
                    }
                }
            }
            Some(ObjectData::FixedDoubleArray(elements)) => {
                if !self.fits(layout::fixed_double_array_size(elements.values.len() as u32)) {
                    return Err(LiteralDecline::TooLarge);
                }
            }
            _ => return Err(LiteralDecline::UnsupportedElements),
        }

        if map.is_dictionary_map || object.out_of_object_properties != 0 {
            return Err(LiteralDecline::SlowProperties);
        }
        for descriptor in map.descriptors.iter() {
            if descriptor.location != PropertyLocation::Field {
                continue;
            }
            spend(budget)?;
            if descriptor.index >= map.in_object_properties {
                return Err(LiteralDecline::SlowProperties);
            }
            let value = *object
                .fields
                .get(descriptor.index as usize)
                .ok_or(LiteralDecline::MalformedBoilerplate)?;
            if descriptor.representation == FieldRepresentation::Double && !self.is_nested_literal(value) {
                self.check_double_field(value)?;
            }
            self.check_nested(value, depth, budget)?;
        }
        Ok(())
    }

    /// Double fields are boxed from a Smi or a heap number.
    fn check_double_field(&self, value: HeapValue) -> Result<(), LiteralDecline> {
        match value {
            HeapValue::Smi(_) => Ok(()),
            HeapValue::Object(object) => self
                .broker
                .heap_number(object)
                .map(|_| ())
                .ok_or(LiteralDecline::MalformedBoilerplate),
        }
    }

    fn is_nested_literal(&self, value: HeapValue) -> bool {
        value.as_object().is_some_and(|object| self.broker.js_object(object).is_some())
    }

    fn check_nested(&self, value: HeapValue, depth: u32, budget: &mut u32) -> Result<(), LiteralDecline> {
        match value.as_object() {
            Some(object) if self.broker.js_object(object).is_some() => {
                self.check_fast_literal(object, depth - 1, budget)
            }
            _ => Ok(()),
        }
    }

    // =========================================================================
    // Boilerplate Copies
    // =========================================================================

    /// Copy `boilerplate` into fresh allocations threaded through `effect`.
    /// Returns the copy.
    pub(super) fn allocate_fast_literal(
        &self,
        graph: &mut Graph,
        effect: &mut NodeId,
        control: NodeId,
        boilerplate: ObjectRef,
        pretenure: PretenureFlag,
    ) -> Result<NodeId, LiteralDecline> {
        let object = self
            .broker
            .js_object(boilerplate)
            .ok_or(LiteralDecline::MalformedBoilerplate)?;
        let map = self.broker.map(object.map).ok_or(LiteralDecline::MalformedBoilerplate)?;
        let roots = self.broker.roots();

        // In-object slots in index order; slack slots hold fillers.
        let mut fields: SmallVec<[Option<NodeId>; 8]> = SmallVec::from_elem(None, map.in_object_properties as usize);
        for descriptor in map.descriptors.iter() {
            if descriptor.location != PropertyLocation::Field {
                continue;
            }
            let value = *object
                .fields
                .get(descriptor.index as usize)
                .ok_or(LiteralDecline::MalformedBoilerplate)?;
            let node = self.literal_field_value(graph, effect, control, value, descriptor.representation, pretenure)?;
            let slot = fields
                .get_mut(descriptor.index as usize)
                .ok_or(LiteralDecline::SlowProperties)?;
            *slot = Some(node);
        }
        let filler = graph.heap_constant(roots.one_pointer_filler_map);

        let elements = self.allocate_fast_literal_elements(graph, effect, control, object.elements, map, pretenure)?;
        let length = if map.is_js_array_map() {
            let length = match object.length {
                Some(length) => self.heap_value_constant(graph, length),
                None => graph.number_constant(self.element_count(object.elements) as f64),
            };
            Some(length)
        } else {
            None
        };

        let mut builder = self.builder(graph, *effect, control);
        builder.allocate(map.instance_size, pretenure, Self::instance_type_of(map.instance_type));
        self.store_object_header(&mut builder, object.map, elements);
        if let Some(length) = length {
            builder.store_field(AccessBuilder::for_js_array_length(map.elements_kind), length);
        }
        for (index, value) in fields.iter().enumerate() {
            let access = AccessBuilder::for_js_object_in_object_property(map, index as u32);
            builder.store_field(access, value.unwrap_or(filler));
        }
        let copy = builder.finish();
        *effect = copy;
        Ok(copy)
    }

    /// Value stored in one in-object field of the copy.
    fn literal_field_value(
        &self,
        graph: &mut Graph,
        effect: &mut NodeId,
        control: NodeId,
        value: HeapValue,
        representation: FieldRepresentation,
        pretenure: PretenureFlag,
    ) -> Result<NodeId, LiteralDecline> {
        let roots = self.broker.roots();
        if let Some(nested) = value.as_object().filter(|_| self.is_nested_literal(value)) {
            return self.allocate_fast_literal(graph, effect, control, nested, pretenure);
        }
        match representation {
            FieldRepresentation::Double => {
                // Double fields point at a private mutable box.
                let number = match value {
                    HeapValue::Smi(smi) => smi as f64,
                    HeapValue::Object(object) => self
                        .broker
                        .heap_number(object)
                        .ok_or(LiteralDecline::MalformedBoilerplate)?,
                };
                let number = graph.float64_constant(number);
                let mut builder = self.builder(graph, *effect, control);
                builder.allocate(
                    layout::HEAP_NUMBER_SIZE,
                    pretenure,
                    Type::from_bits(TypeBits::OTHER_INTERNAL),
                );
                builder.store_constant(AccessBuilder::for_map(), roots.mutable_heap_number_map);
                builder.store_field(AccessBuilder::for_heap_number_value(), number);
                let boxed = builder.finish();
                *effect = boxed;
                Ok(boxed)
            }
            FieldRepresentation::Smi if value == HeapValue::Object(roots.uninitialized) => {
                Ok(graph.number_constant(0.0))
            }
            _ => Ok(self.heap_value_constant(graph, value)),
        }
    }

    /// Backing store of the copy: the boilerplate's own store when it is
    /// empty or copy-on-write, a fresh copy otherwise.
    fn allocate_fast_literal_elements(
        &self,
        graph: &mut Graph,
        effect: &mut NodeId,
        control: NodeId,
        elements: ObjectRef,
        map: &MapData,
        pretenure: PretenureFlag,
    ) -> Result<NodeId, LiteralDecline> {
        let roots = self.broker.roots();
        match self.broker.get(elements) {
            Some(ObjectData::FixedArray(data))
                if data.values.is_empty() || data.map == roots.fixed_cow_array_map =>
            {
                Ok(graph.heap_constant(elements))
            }
            Some(ObjectData::FixedArray(data)) => {
                let hole = graph.heap_constant(roots.the_hole);
                let mut values: SmallVec<[NodeId; 16]> = SmallVec::with_capacity(data.values.len());
                for value in data.values.iter() {
                    let node = match *value {
                        None => hole,
                        Some(value) => match value.as_object() {
                            Some(object) if self.broker.js_object(object).is_some() => {
                                self.allocate_fast_literal(graph, effect, control, object, pretenure)?
                            }
                            _ => self.heap_value_constant(graph, value),
                        },
                    };
                    values.push(node);
                }
                let access = AccessBuilder::for_fixed_array_element(map.elements_kind);
                let mut builder = self.builder(graph, *effect, control);
                builder.allocate_fixed_array(values.len() as u32, data.map, pretenure);
                for (index, &value) in values.iter().enumerate() {
                    builder.store_element(access, index as u32, value);
                }
                let copy = builder.finish();
                *effect = copy;
                Ok(copy)
            }
            Some(ObjectData::FixedDoubleArray(data)) if data.values.is_empty() => Ok(graph.heap_constant(elements)),
            Some(ObjectData::FixedDoubleArray(data)) => {
                let values: SmallVec<[NodeId; 16]> = data
                    .values
                    .iter()
                    .map(|value| graph.float64_constant(value.unwrap_or(f64::from_bits(HOLE_NAN_BITS))))
                    .collect();
                let mut builder = self.builder(graph, *effect, control);
                builder.allocate_double_array(values.len() as u32, roots.fixed_double_array_map, pretenure);
                for (index, &value) in values.iter().enumerate() {
                    builder.store_element(AccessBuilder::for_fixed_double_array_element(), index as u32, value);
                }
                let copy = builder.finish();
                *effect = copy;
                Ok(copy)
            }
            _ => Err(LiteralDecline::UnsupportedElements),
        }
    }

    fn element_count(&self, elements: ObjectRef) -> usize {
        match self.broker.get(elements) {
            Some(ObjectData::FixedArray(data)) => data.values.len(),
            Some(ObjectData::FixedDoubleArray(data)) => data.values.len(),
            _ => 0,
        }
    }

    /// Constant for a tagged slot value. Heap numbers become number
    /// constants.
    pub(super) fn heap_value_constant(&self, graph: &mut Graph, value: HeapValue) -> NodeId {
        match value {
            HeapValue::Smi(smi) => graph.number_constant(smi as f64),
            HeapValue::Object(object) => match self.broker.heap_number(object) {
                Some(number) => graph.number_constant(number),
                None => graph.heap_constant(object),
            },
        }
    }

    // =========================================================================
    // Reductions
    // =========================================================================

    /// `[...]` or `{...}` copied from the allocation site's boilerplate.
    pub(super) fn reduce_create_literal_array_or_object(
        &self,
        graph: &mut Graph,
        node: NodeId,
        params: CreateLiteralParameters,
    ) -> Reduction {
        let Some(site) = self
            .literal_feedback(graph, node, params.slot.0)
            .and_then(|feedback| self.broker.allocation_site(feedback))
        else {
            return Reduction::NoChange;
        };
        let Some(boilerplate) = site.boilerplate else {
            return Reduction::NoChange;
        };
        let mut budget = self.config.max_fast_literal_properties;
        if let Err(decline) = self.check_fast_literal(boilerplate, self.config.max_fast_literal_depth, &mut budget) {
            log::debug!("literal {} stays generic: {}", node, decline);
            return Reduction::NoChange;
        }

        let pretenure = self.pretenure_of(site);
        let mut effect = graph.effect_input(node);
        let control = graph.control_input(node);
        match self.allocate_fast_literal(graph, &mut effect, control, boilerplate, pretenure) {
            Ok(value) => {
                graph.replace_with_value(node, value, Some(effect), Some(control));
                Reduction::Replace(value)
            }
            Err(decline) => {
                log::debug!("literal {} stays generic: {}", node, decline);
                Reduction::NoChange
            }
        }
    }

    /// `/pattern/flags` copied from the boilerplate in the feedback slot.
    pub(super) fn reduce_create_literal_regexp(
        &self,
        graph: &mut Graph,
        node: NodeId,
        params: CreateLiteralParameters,
    ) -> Reduction {
        let Some(regexp) = self
            .literal_feedback(graph, node, params.slot.0)
            .and_then(|feedback| self.broker.regexp(feedback))
        else {
            return Reduction::NoChange;
        };
        let effect = graph.effect_input(node);
        let control = graph.control_input(node);
        let flags = self.heap_value_constant(graph, regexp.flags);
        let last_index = self.heap_value_constant(graph, regexp.last_index);

        let mut builder = self.builder(graph, effect, control);
        builder.allocate(
            layout::REGEXP_SIZE_WITH_IN_OBJECT_PROPERTIES,
            PretenureFlag::NotTenured,
            Type::from_bits(TypeBits::OTHER_OBJECT),
        );
        builder.store_constant(AccessBuilder::for_map(), regexp.map);
        builder.store_constant(AccessBuilder::for_js_object_properties_or_hash(), regexp.properties);
        builder.store_constant(AccessBuilder::for_js_object_elements(), regexp.elements);
        builder.store_constant(AccessBuilder::for_regexp_data(), regexp.data);
        builder.store_constant(AccessBuilder::for_regexp_source(), regexp.source);
        builder.store_field(AccessBuilder::for_regexp_flags(), flags);
        builder.store_field(AccessBuilder::for_regexp_last_index(), last_index);
        let value = builder.finish();
        graph.replace_with_value(node, value, Some(value), Some(control));
        Reduction::Replace(value)
    }

    /// `{}` with the native context's object literal map.
    pub(super) fn reduce_create_empty_literal_object(&self, graph: &mut Graph, node: NodeId) -> Reduction {
        let map_ref = self.broker.native_context().object_literal_map;
        let Some(map) = self.broker.map(map_ref) else {
            return Reduction::NoChange;
        };
        let effect = graph.effect_input(node);
        let control = graph.control_input(node);
        let undefined = self.broker.roots().undefined;
        let empty_fixed_array = graph.heap_constant(self.broker.roots().empty_fixed_array);

        let mut builder = self.builder(graph, effect, control);
        builder.allocate(map.instance_size, PretenureFlag::NotTenured, Self::instance_type_of(map.instance_type));
        self.store_object_header(&mut builder, map_ref, empty_fixed_array);
        for index in 0..map.in_object_properties {
            builder.store_constant(AccessBuilder::for_js_object_in_object_property(map, index), undefined);
        }
        builder.graph().relax_controls(node);
        builder.finish_and_change(node);
        Reduction::Changed(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoweringConfig;
    use crate::heap::{
        AllocationSiteData, ElementsKind, FieldDescriptor, HeapBroker, HeapSnapshot, InstanceType, JSObjectData,
        JSRegExpData,
    };
    use crate::ir::operators::FeedbackSlot;
    use crate::ir::{Operator, WriteBarrierKind};
    use crate::lowering::testing::{
        assert_declined, assert_declined_with, field_offsets, js_node, lower, lower_with, stores,
    };

    /// Plain object boilerplate with one tagged field per value.
    fn object(heap: &mut HeapSnapshot, values: &[HeapValue]) -> ObjectRef {
        let mut map = MapData::object_with_in_object_properties(values.len() as u32);
        for index in 0..values.len() {
            map = map.with_field(FieldDescriptor::field(
                format!("p{index}"),
                FieldRepresentation::Tagged,
                index as u32,
            ));
        }
        let map = heap.add_map(map);
        let elements = heap.roots().empty_fixed_array;
        heap.add_js_object(JSObjectData {
            map,
            elements,
            out_of_object_properties: 0,
            fields: values.to_vec(),
            length: None,
        })
    }

    /// Object nested `levels` objects deep, innermost holding a Smi.
    fn nested(heap: &mut HeapSnapshot, levels: u32) -> ObjectRef {
        let mut inner = object(heap, &[HeapValue::Smi(1)]);
        for _ in 1..levels {
            inner = object(heap, &[HeapValue::Object(inner)]);
        }
        inner
    }

    /// Closure constant whose feedback slot 0 holds `feedback`.
    fn closure(heap: &mut HeapSnapshot, feedback: ObjectRef) -> ObjectRef {
        let vector = heap.add_feedback_vector(vec![Some(feedback)]);
        let shared = heap.add_shared_info(crate::heap::SharedInfoData {
            kind: crate::heap::FunctionKind::Normal,
            formal_parameter_count: 0,
            has_duplicate_parameters: false,
            register_count: 0,
        });
        heap.add_function(crate::heap::FunctionData {
            shared,
            initial_map: None,
            feedback_vector: Some(vector),
            is_constructor: false,
        })
    }

    fn literal_site(heap: &mut HeapSnapshot, boilerplate: ObjectRef, pretenure: PretenureFlag) -> ObjectRef {
        heap.add_allocation_site(AllocationSiteData {
            boilerplate: Some(boilerplate),
            elements_kind: ElementsKind::Packed,
            pretenure,
            can_inline_call: true,
        })
    }

    fn object_literal(graph: &mut Graph, closure: ObjectRef) -> NodeId {
        let closure = graph.heap_constant(closure);
        let params = CreateLiteralParameters {
            constant: ObjectRef::new(0),
            slot: FeedbackSlot(0),
            length: 0,
            flags: 0,
        };
        js_node(graph, Operator::JSCreateLiteralObject(params), &[closure])
    }

    fn literal_graph(heap: &mut HeapSnapshot, boilerplate: ObjectRef) -> (Graph, NodeId) {
        let site = literal_site(heap, boilerplate, PretenureFlag::NotTenured);
        let closure = closure(heap, site);
        let mut graph = Graph::new();
        let node = object_literal(&mut graph, closure);
        (graph, node)
    }

    #[test]
    fn test_two_field_object_store_order() {
        let mut heap = HeapSnapshot::new();
        let name = heap.add_string("x");
        let boilerplate = object(&mut heap, &[HeapValue::Smi(1), HeapValue::Object(name)]);
        let (mut graph, node) = literal_graph(&mut heap, boilerplate);

        let Reduction::Replace(value) = lower(&heap, &mut graph, node) else {
            panic!("literal was not inlined");
        };
        let chain = stores(&graph, value);
        assert_eq!(chain.len(), 5);
        let Operator::StoreField(map) = chain[0] else {
            panic!("expected map store");
        };
        assert_eq!(map.write_barrier, WriteBarrierKind::Map);
        assert_eq!(field_offsets(&graph, value), [0, 8, 16, 24, 32]);
        let allocations = graph
            .live_ids()
            .filter(|&id| matches!(graph.op(id), Operator::Allocate(_)))
            .count();
        assert_eq!(allocations, 1);
    }

    #[test]
    fn test_nesting_at_depth_limit_is_inlined() {
        let mut heap = HeapSnapshot::new();
        let boilerplate = nested(&mut heap, 3);
        let (mut graph, node) = literal_graph(&mut heap, boilerplate);

        assert!(matches!(lower(&heap, &mut graph, node), Reduction::Replace(_)));
    }

    #[test]
    fn test_nesting_past_depth_limit_declines_outer_literal() {
        let mut heap = HeapSnapshot::new();
        let boilerplate = nested(&mut heap, 4);
        let (mut graph, node) = literal_graph(&mut heap, boilerplate);

        assert_declined(&heap, &mut graph, node);
        let mut budget = 252;
        let config = LoweringConfig::default();
        let lowering = CreateLowering::new(&heap, &config, std::sync::Arc::new(crate::diagnostics::NoChecks));
        assert_eq!(
            lowering.check_fast_literal(boilerplate, 3, &mut budget),
            Err(LiteralDecline::TooDeep)
        );
    }

    #[test]
    fn test_property_budget_spans_nested_objects() {
        let mut heap = HeapSnapshot::new();
        let inner = object(&mut heap, &[HeapValue::Smi(1), HeapValue::Smi(2)]);
        let boilerplate = object(&mut heap, &[HeapValue::Object(inner), HeapValue::Smi(3)]);
        let config = LoweringConfig {
            max_fast_literal_properties: 3,
            ..LoweringConfig::default()
        };
        let (mut graph, node) = literal_graph(&mut heap, boilerplate);
        assert_declined_with(&heap, &config, &mut graph, node);

        let config = LoweringConfig {
            max_fast_literal_properties: 4,
            ..LoweringConfig::default()
        };
        assert!(matches!(lower_with(&heap, &config, &mut graph, node), Reduction::Replace(_)));
    }

    #[test]
    fn test_nested_object_allocated_first() {
        let mut heap = HeapSnapshot::new();
        let inner = object(&mut heap, &[HeapValue::Smi(1)]);
        let boilerplate = object(&mut heap, &[HeapValue::Object(inner)]);
        let (mut graph, node) = literal_graph(&mut heap, boilerplate);

        let Reduction::Replace(value) = lower(&heap, &mut graph, node) else {
            panic!("literal was not inlined");
        };
        let allocation = graph.value_input(value, 0);
        let region = graph.effect_input(allocation);
        let inner_copy = graph.effect_input(region);
        assert_eq!(graph.op(inner_copy), Operator::FinishRegion);
        let field_store = graph.effect_input(value);
        assert_eq!(graph.value_input(field_store, 1), inner_copy);
    }

    #[test]
    fn test_double_field_is_boxed() {
        let mut heap = HeapSnapshot::new();
        let number = heap.add_heap_number(1.5);
        let map = heap.add_map(
            MapData::object_with_in_object_properties(1)
                .with_field(FieldDescriptor::field("d", FieldRepresentation::Double, 0)),
        );
        let elements = heap.roots().empty_fixed_array;
        let boilerplate = heap.add_js_object(JSObjectData {
            map,
            elements,
            out_of_object_properties: 0,
            fields: vec![HeapValue::Object(number)],
            length: None,
        });
        let (mut graph, node) = literal_graph(&mut heap, boilerplate);

        let Reduction::Replace(value) = lower(&heap, &mut graph, node) else {
            panic!("literal was not inlined");
        };
        let field_store = graph.effect_input(value);
        let boxed = graph.value_input(field_store, 1);
        assert_eq!(graph.op(boxed), Operator::FinishRegion);
        let value_store = graph.effect_input(boxed);
        assert_eq!(graph.value_input(value_store, 1), graph.float64_constant(1.5));
        let map_store = graph.effect_input(value_store);
        assert_eq!(
            graph.node(graph.value_input(map_store, 1)).as_heap_constant(),
            Some(heap.roots().mutable_heap_number_map)
        );
    }

    #[test]
    fn test_tenured_literal_boxes_doubles_in_old_space() {
        let mut heap = HeapSnapshot::new();
        let number = heap.add_heap_number(1.5);
        let map = heap.add_map(
            MapData::object_with_in_object_properties(1)
                .with_field(FieldDescriptor::field("d", FieldRepresentation::Double, 0)),
        );
        let elements = heap.roots().empty_fixed_array;
        let boilerplate = heap.add_js_object(JSObjectData {
            map,
            elements,
            out_of_object_properties: 0,
            fields: vec![HeapValue::Object(number)],
            length: None,
        });
        let site = literal_site(&mut heap, boilerplate, PretenureFlag::Tenured);
        let closure = closure(&mut heap, site);
        let mut graph = Graph::new();
        let node = object_literal(&mut graph, closure);

        let Reduction::Replace(value) = lower(&heap, &mut graph, node) else {
            panic!("literal was not inlined");
        };
        let boxed = graph.value_input(graph.effect_input(value), 1);
        assert_eq!(graph.op(graph.value_input(value, 0)), Operator::Allocate(PretenureFlag::Tenured));
        assert_eq!(graph.op(graph.value_input(boxed, 0)), Operator::Allocate(PretenureFlag::Tenured));
    }

    #[test]
    fn test_double_field_without_number_declines_before_nested_copy() {
        let mut heap = HeapSnapshot::new();
        let inner = object(&mut heap, &[HeapValue::Smi(1)]);
        let name = heap.add_string("not a number");
        let map = heap.add_map(
            MapData::object_with_in_object_properties(2)
                .with_field(FieldDescriptor::field("o", FieldRepresentation::Tagged, 0))
                .with_field(FieldDescriptor::field("d", FieldRepresentation::Double, 1)),
        );
        let elements = heap.roots().empty_fixed_array;
        let boilerplate = heap.add_js_object(JSObjectData {
            map,
            elements,
            out_of_object_properties: 0,
            fields: vec![HeapValue::Object(inner), HeapValue::Object(name)],
            length: None,
        });
        let (mut graph, node) = literal_graph(&mut heap, boilerplate);

        assert_declined(&heap, &mut graph, node);
        let mut budget = 252;
        let config = LoweringConfig::default();
        let lowering = CreateLowering::new(&heap, &config, std::sync::Arc::new(crate::diagnostics::NoChecks));
        assert_eq!(
            lowering.check_fast_literal(boilerplate, 3, &mut budget),
            Err(LiteralDecline::MalformedBoilerplate)
        );
    }

    #[test]
    fn test_uninitialized_smi_field_becomes_zero() {
        let mut heap = HeapSnapshot::new();
        let uninitialized = heap.roots().uninitialized;
        let map = heap.add_map(
            MapData::object_with_in_object_properties(1)
                .with_field(FieldDescriptor::field("s", FieldRepresentation::Smi, 0)),
        );
        let elements = heap.roots().empty_fixed_array;
        let boilerplate = heap.add_js_object(JSObjectData {
            map,
            elements,
            out_of_object_properties: 0,
            fields: vec![HeapValue::Object(uninitialized)],
            length: None,
        });
        let (mut graph, node) = literal_graph(&mut heap, boilerplate);

        let Reduction::Replace(value) = lower(&heap, &mut graph, node) else {
            panic!("literal was not inlined");
        };
        let field_store = graph.effect_input(value);
        assert_eq!(graph.node(graph.value_input(field_store, 1)).as_number(), Some(0.0));
    }

    #[test]
    fn test_slack_slots_get_fillers() {
        let mut heap = HeapSnapshot::new();
        let map = heap.add_map(
            MapData::object_with_in_object_properties(3)
                .with_field(FieldDescriptor::field("a", FieldRepresentation::Tagged, 0)),
        );
        let elements = heap.roots().empty_fixed_array;
        let boilerplate = heap.add_js_object(JSObjectData {
            map,
            elements,
            out_of_object_properties: 0,
            fields: vec![HeapValue::Smi(7)],
            length: None,
        });
        let (mut graph, node) = literal_graph(&mut heap, boilerplate);

        let Reduction::Replace(value) = lower(&heap, &mut graph, node) else {
            panic!("literal was not inlined");
        };
        let filler = graph.heap_constant(heap.roots().one_pointer_filler_map);
        let last = graph.effect_input(value);
        let previous = graph.effect_input(last);
        assert_eq!(graph.value_input(last, 1), filler);
        assert_eq!(graph.value_input(previous, 1), filler);
    }

    fn array_boilerplate(heap: &mut HeapSnapshot, kind: ElementsKind, elements: ObjectRef, length: i32) -> ObjectRef {
        let map = heap.native_context().js_array_map(kind).unwrap_or(ObjectRef::new(0));
        heap.add_js_object(JSObjectData {
            map,
            elements,
            out_of_object_properties: 0,
            fields: Vec::new(),
            length: Some(HeapValue::Smi(length)),
        })
    }

    #[test]
    fn test_array_literal_copies_elements() {
        let mut heap = HeapSnapshot::new();
        let elements = heap.add_fixed_array(vec![Some(HeapValue::Smi(1)), None, Some(HeapValue::Smi(3))]);
        let boilerplate = array_boilerplate(&mut heap, ElementsKind::HoleySmi, elements, 3);
        let (mut graph, node) = literal_graph(&mut heap, boilerplate);

        let Reduction::Replace(value) = lower(&heap, &mut graph, node) else {
            panic!("literal was not inlined");
        };
        assert_eq!(field_offsets(&graph, value), [0, 8, 16, 24]);
        let allocation = graph.value_input(value, 0);
        let copy = graph.effect_input(graph.effect_input(allocation));
        assert_eq!(graph.op(copy), Operator::FinishRegion);
        let hole = graph.heap_constant(heap.roots().the_hole);
        let middle = graph.effect_input(graph.effect_input(copy));
        assert_eq!(graph.value_input(middle, 2), hole);
    }

    #[test]
    fn test_cow_elements_are_shared() {
        let mut heap = HeapSnapshot::new();
        let elements = heap.add_cow_array(vec![Some(HeapValue::Smi(1)), Some(HeapValue::Smi(2))]);
        let boilerplate = array_boilerplate(&mut heap, ElementsKind::PackedSmi, elements, 2);
        let (mut graph, node) = literal_graph(&mut heap, boilerplate);

        let Reduction::Replace(value) = lower(&heap, &mut graph, node) else {
            panic!("literal was not inlined");
        };
        let elements_store = graph.effect_input(graph.effect_input(value));
        assert_eq!(graph.node(graph.value_input(elements_store, 1)).as_heap_constant(), Some(elements));
    }

    #[test]
    fn test_double_elements_copy_holes_as_hole_nan() {
        let mut heap = HeapSnapshot::new();
        let elements = heap.add_double_array(vec![Some(0.5), None]);
        let boilerplate = array_boilerplate(&mut heap, ElementsKind::HoleyDouble, elements, 2);
        let (mut graph, node) = literal_graph(&mut heap, boilerplate);

        let Reduction::Replace(value) = lower(&heap, &mut graph, node) else {
            panic!("literal was not inlined");
        };
        let allocation = graph.value_input(value, 0);
        let copy = graph.effect_input(graph.effect_input(allocation));
        let last = graph.effect_input(copy);
        let hole_nan = graph.float64_constant(f64::from_bits(HOLE_NAN_BITS));
        assert_eq!(graph.value_input(last, 2), hole_nan);
    }

    #[test]
    fn test_deprecated_and_dictionary_maps_decline() {
        let mut heap = HeapSnapshot::new();
        let elements = heap.roots().empty_fixed_array;
        let deprecated = heap.add_map(MapData::object_with_in_object_properties(0).deprecated());
        let dictionary = heap.add_map(MapData::object_with_in_object_properties(0).dictionary());
        for map in [deprecated, dictionary] {
            let boilerplate = heap.add_js_object(JSObjectData {
                map,
                elements,
                out_of_object_properties: 0,
                fields: Vec::new(),
                length: None,
            });
            let (mut graph, node) = literal_graph(&mut heap, boilerplate);
            assert_declined(&heap, &mut graph, node);
        }
    }

    #[test]
    fn test_pretenured_literal_keeps_barriers() {
        let mut heap = HeapSnapshot::new();
        let name = heap.add_string("v");
        let boilerplate = object(&mut heap, &[HeapValue::Object(name)]);
        let site = literal_site(&mut heap, boilerplate, PretenureFlag::Tenured);
        let closure = closure(&mut heap, site);
        let mut graph = Graph::new();
        let node = object_literal(&mut graph, closure);

        let Reduction::Replace(value) = lower(&heap, &mut graph, node) else {
            panic!("literal was not inlined");
        };
        assert_eq!(graph.op(graph.value_input(value, 0)), Operator::Allocate(PretenureFlag::Tenured));
        let Operator::StoreField(field) = graph.op(graph.effect_input(value)) else {
            panic!("expected field store");
        };
        assert_eq!(field.write_barrier, WriteBarrierKind::Full);
    }

    #[test]
    fn test_literal_without_site_declines() {
        let mut heap = HeapSnapshot::new();
        let undefined = heap.roots().undefined;
        let closure = closure(&mut heap, undefined);
        let mut graph = Graph::new();
        let node = object_literal(&mut graph, closure);

        assert_declined(&heap, &mut graph, node);
    }

    #[test]
    fn test_regexp_literal_copies_boilerplate() {
        let mut heap = HeapSnapshot::new();
        let map = heap.add_map(MapData::new(InstanceType::JSRegExp, layout::REGEXP_SIZE_WITH_IN_OBJECT_PROPERTIES));
        let empty = heap.roots().empty_fixed_array;
        let data = heap.add_fixed_array(Vec::new());
        let source = heap.add_string("a+");
        let regexp = heap.add(ObjectData::JSRegExp(JSRegExpData {
            map,
            properties: empty,
            elements: empty,
            data,
            source,
            flags: HeapValue::Smi(1),
            last_index: HeapValue::Smi(0),
        }));
        let closure = closure(&mut heap, regexp);
        let mut graph = Graph::new();
        let closure = graph.heap_constant(closure);
        let params = CreateLiteralParameters {
            constant: source,
            slot: FeedbackSlot(0),
            length: 0,
            flags: 1,
        };
        let node = js_node(&mut graph, Operator::JSCreateLiteralRegExp(params), &[closure]);

        let Reduction::Replace(value) = lower(&heap, &mut graph, node) else {
            panic!("regexp was not inlined");
        };
        assert_eq!(field_offsets(&graph, value), [0, 8, 16, 24, 32, 40, 48]);
        let allocation = graph.value_input(value, 0);
        assert_eq!(
            graph.node(graph.value_input(allocation, 0)).as_int32(),
            Some(layout::REGEXP_SIZE_WITH_IN_OBJECT_PROPERTIES as i32)
        );
    }

    #[test]
    fn test_empty_object_literal() {
        let heap = HeapSnapshot::new();
        let mut graph = Graph::new();
        let node = js_node(&mut graph, Operator::JSCreateEmptyLiteralObject, &[]);

        assert_eq!(lower(&heap, &mut graph, node), Reduction::Changed(node));
        let undefined = graph.heap_constant(heap.roots().undefined);
        let in_object = graph.effect_input(node);
        assert_eq!(graph.value_input(in_object, 1), undefined);
        assert_eq!(stores(&graph, node).len(), 7);
    }
}
