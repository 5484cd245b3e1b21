use quiver_common::{EdgeTypeId, LabelId, PropertyId, PropertyValue};
use quiver_planner::PlanningContext;
use quiver_storage::indexes::ScanBound;
use quiver_storage::GraphAccessor;

/// Adapts the graph accessor to the planner's statistics interface.
pub struct StorageStats<'a>(pub &'a GraphAccessor);

impl PlanningContext for StorageStats<'_> {
    fn label_id(&self, name: &str) -> LabelId {
        self.0.label_id(name)
    }

    fn property_id(&self, name: &str) -> PropertyId {
        self.0.property_id(name)
    }

    fn edge_type_id(&self, name: &str) -> EdgeTypeId {
        self.0.edge_type_id(name)
    }

    fn vertices_count(&self) -> usize {
        self.0.vertices_count()
    }

    fn vertices_count_by_label(&self, label: LabelId) -> usize {
        self.0.vertices_count_by_label(label)
    }

    fn vertices_count_by_label_property(&self, label: LabelId, property: PropertyId) -> usize {
        self.0.vertices_count_by_label_property(label, property)
    }

    fn vertices_count_by_value(
        &self,
        label: LabelId,
        property: PropertyId,
        value: &PropertyValue,
    ) -> usize {
        self.0.vertices_count_by_value(label, property, value)
    }

    fn vertices_count_by_range(
        &self,
        label: LabelId,
        property: PropertyId,
        lower: Option<(&PropertyValue, bool)>,
        upper: Option<(&PropertyValue, bool)>,
    ) -> usize {
        let make = |bound: Option<(&PropertyValue, bool)>| {
            bound.map(|(value, inclusive)| {
                if inclusive {
                    ScanBound::Inclusive(value.clone())
                } else {
                    ScanBound::Exclusive(value.clone())
                }
            })
        };
        let lower = make(lower);
        let upper = make(upper);
        self.0
            .vertices_count_by_range(label, property, lower.as_ref(), upper.as_ref())
    }

    fn label_property_index_exists(&self, label: LabelId, property: PropertyId) -> bool {
        self.0.label_property_index_exists(label, property)
    }
}
