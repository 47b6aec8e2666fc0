use crate::error::GraphError;
use crate::model::{NodeTemplate, Properties};
use crate::registry::{NodeFactory, NodeMetadata, NodeRegistry};

pub mod group;
pub mod math;

// Generates a factory around a template builder `fn(&Properties) -> Result<NodeTemplate, GraphError>`.
macro_rules! builtin_factory {
    ($name:ident, $id:literal, $label:literal, $category:literal, $description:literal, $build:path) => {
        pub struct $name;
        impl NodeFactory for $name {
            fn build(&self, config: &Properties) -> Result<NodeTemplate, GraphError> {
                let mut template = $build(config)?;
                template.type_tag = $id.to_string();
                template
                    .properties
                    .extend(config.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(template)
            }
            fn metadata(&self) -> NodeMetadata {
                let meta = NodeMetadata::new($id, $label, $category, Some($description));
                match self.build(&Properties::new()) {
                    Ok(template) => meta.with_ports(&template),
                    Err(_) => meta,
                }
            }
        }
    };
}

builtin_factory!(
    NumberNodeFactory,
    "number",
    "Number",
    "Input",
    "Literal number or list of numbers",
    math::number
);

builtin_factory!(
    RangeNodeFactory,
    "range",
    "Range",
    "Sequence",
    "Numbers from start up to (excluding) stop",
    math::range
);

builtin_factory!(AddNodeFactory, "add", "Add", "Math", "a + b", math::add);

builtin_factory!(
    SubtractNodeFactory,
    "subtract",
    "Subtract",
    "Math",
    "a - b",
    math::subtract
);

builtin_factory!(
    MultiplyNodeFactory,
    "multiply",
    "Multiply",
    "Math",
    "a * b",
    math::multiply
);

builtin_factory!(
    DivideNodeFactory,
    "divide",
    "Divide",
    "Math",
    "a / b",
    math::divide
);

builtin_factory!(
    PointNodeFactory,
    "point",
    "Point",
    "Geometry",
    "Point from x, y and z",
    math::point
);

builtin_factory!(
    LengthNodeFactory,
    "length",
    "List Length",
    "Sequence",
    "Number of items in each innermost group",
    math::length
);

builtin_factory!(
    SumNodeFactory,
    "sum",
    "Sum",
    "Sequence",
    "Total of each innermost group",
    math::sum
);

builtin_factory!(
    GroupNodeFactory,
    "group",
    "Group",
    "Structure",
    "Sub-graph container whose ports forward to nested nodes",
    group::group
);

/// Installs the built-in catalogue.
pub fn register_core_nodes(registry: &mut NodeRegistry) {
    registry.register("number", Box::new(NumberNodeFactory));
    registry.register("range", Box::new(RangeNodeFactory));
    registry.register("add", Box::new(AddNodeFactory));
    registry.register("subtract", Box::new(SubtractNodeFactory));
    registry.register("multiply", Box::new(MultiplyNodeFactory));
    registry.register("divide", Box::new(DivideNodeFactory));
    registry.register("point", Box::new(PointNodeFactory));
    registry.register("length", Box::new(LengthNodeFactory));
    registry.register("sum", Box::new(SumNodeFactory));
    registry.register("group", Box::new(GroupNodeFactory));
}
