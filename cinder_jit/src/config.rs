//! Tuning parameters for lowering and graph assembly.
//!
//! The limits bound the size of inline allocations so that the worst case
//! still fits one regular heap object. Defaults match the heap layout in
//! [`crate::heap::layout`].

use crate::error::ConfigError;

/// Configuration for the creation lowering.
///
/// # Example
///
/// ```
/// use cinder_jit::config::LoweringConfig;
///
/// // Shallow literals only.
/// let config = LoweringConfig {
///     max_fast_literal_depth: 1,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct LoweringConfig {
    // =========================================================================
    // Literals
    // =========================================================================
    /// Maximum nesting depth of a boilerplate that is copied inline.
    ///
    /// A literal nested one level deeper than this declines for the whole
    /// outer literal.
    ///
    /// Default: 3
    pub max_fast_literal_depth: u32,

    /// Maximum number of properties and elements copied inline across the
    /// whole literal, nested objects included.
    ///
    /// Default: 252
    pub max_fast_literal_properties: u32,

    // =========================================================================
    // Arrays
    // =========================================================================
    /// Largest constant length for which `new Array(n)` is allocated and
    /// hole-filled inline.
    ///
    /// Default: 16
    pub element_loop_unroll_limit: u32,

    /// Maximum number of explicit values in an inline array construction.
    ///
    /// Default: 63384 (one regular heap object of doubles)
    pub max_inline_array_values: u32,

    /// Upper bound on any single inline allocation, in bytes.
    ///
    /// Default: 507136
    pub max_regular_heap_object_size: u32,

    // =========================================================================
    // Contexts
    // =========================================================================
    /// Inline function and eval contexts have fewer slots than this.
    ///
    /// Default: 16
    pub function_context_allocation_limit: u32,

    /// Inline block contexts are shorter than this.
    ///
    /// Default: 16
    pub block_context_allocation_limit: u32,

    // =========================================================================
    // Feedback
    // =========================================================================
    /// Honor the pretenuring decision recorded on allocation sites.
    ///
    /// When disabled every inline allocation targets the young generation.
    ///
    /// Default: true
    pub allocation_site_pretenuring: bool,
}

impl Default for LoweringConfig {
    fn default() -> Self {
        Self {
            max_fast_literal_depth: 3,
            max_fast_literal_properties: 252,
            element_loop_unroll_limit: 16,
            max_inline_array_values: 63_384,
            max_regular_heap_object_size: 507_136,
            function_context_allocation_limit: 16,
            block_context_allocation_limit: 16,
            allocation_site_pretenuring: true,
        }
    }
}

impl LoweringConfig {
    /// Configuration that declines every size-bounded fast path.
    pub fn no_inline_allocation() -> Self {
        Self {
            max_fast_literal_depth: 0,
            max_fast_literal_properties: 0,
            element_loop_unroll_limit: 0,
            max_inline_array_values: 0,
            function_context_allocation_limit: 0,
            block_context_allocation_limit: 0,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        use crate::heap::layout;

        // Elements, array header and a trailing allocation memento.
        let largest_array = layout::fixed_array_size(self.max_inline_array_values)
            + layout::JS_ARRAY_SIZE
            + layout::ALLOCATION_MEMENTO_SIZE;
        if largest_array > self.max_regular_heap_object_size {
            return Err(ConfigError::InlineArrayTooLarge {
                values: self.max_inline_array_values,
                limit: self.max_regular_heap_object_size,
            });
        }
        if self.element_loop_unroll_limit > self.max_inline_array_values
            && self.max_inline_array_values != 0
        {
            return Err(ConfigError::UnrollLimitAboveInlineLimit);
        }
        Ok(())
    }
}

/// Configuration for the structured assembler.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Emit `Comment` nodes for `CodeAssembler::comment`.
    ///
    /// Default: false
    pub code_comments: bool,

    /// Node capacity reserved up front for a new graph.
    ///
    /// Default: 256
    pub initial_node_capacity: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            code_comments: false,
            initial_node_capacity: 256,
        }
    }
}
