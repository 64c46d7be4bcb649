//! Depth-first flattening of the build tree into the traversal layout.

use crate::{
    build::{BuildNode, BuildResult},
    bvh::BvhNode,
    scope_print,
    vector::BvhVector,
};

/// Lays out `build` in depth-first pre-order: the root is node 0 and the first child of
/// every interior node `i` is node `i + 1`. Leaf object ranges follow the same order.
pub fn flatten<V: BvhVector>(build: &BuildResult<V>) -> (Vec<BvhNode<V>>, Vec<u32>) {
    scope_print!("bvh flatten");

    let mut nodes = Vec::with_capacity(build.nodes.len());
    let mut object_indices = Vec::with_capacity(build.object_indices.len());

    flatten_node(build, 0, &mut nodes, &mut object_indices);

    assert_eq!(nodes.len(), build.nodes.len(), "BVH node count changed while flattening");
    assert_eq!(
        object_indices.len(),
        build.object_indices.len(),
        "BVH object index count changed while flattening"
    );

    (nodes, object_indices)
}

/// Recursion depth is bounded by the build's depth limit.
fn flatten_node<V: BvhVector>(
    build: &BuildResult<V>,
    build_index: u32,
    nodes: &mut Vec<BvhNode<V>>,
    object_indices: &mut Vec<u32>,
) -> u32 {
    let index = nodes.len() as u32;
    match build.nodes[build_index as usize] {
        BuildNode::Leaf {
            bounds,
            object_offset,
            object_count,
        } => {
            let start = object_offset as usize;
            nodes.push(BvhNode {
                aabb: bounds,
                offset: object_indices.len() as u32,
                object_count,
                axis: 0,
            });
            object_indices.extend_from_slice(&build.object_indices[start..start + object_count as usize]);
        }
        BuildNode::Interior {
            bounds,
            axis,
            children,
        } => {
            nodes.push(BvhNode {
                aabb: bounds,
                offset: 0,
                object_count: 0,
                axis,
            });
            let first = flatten_node(build, children[0], nodes, object_indices);
            debug_assert_eq!(first, index + 1);
            let second = flatten_node(build, children[1], nodes, object_indices);
            nodes[index as usize].offset = second;
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aabb::Aabb;
    use glam::{vec2, Vec2};

    fn leaf(x: f32, object_offset: u32, object_count: u32) -> BuildNode<Vec2> {
        BuildNode::Leaf {
            bounds: Aabb::new(vec2(x, 0.0), vec2(x + 1.0, 1.0)),
            object_offset,
            object_count,
        }
    }

    #[test]
    fn test_flatten_reorders_depth_first() {
        // Build order as a parallel build may leave it: 0 -> (3, 1), 1 -> (2, 4).
        let bounds = Aabb::new(vec2(0.0, 0.0), vec2(3.0, 1.0));
        let build = BuildResult {
            nodes: vec![
                BuildNode::Interior {
                    bounds,
                    axis: 0,
                    children: [3, 1],
                },
                BuildNode::Interior {
                    bounds: Aabb::new(vec2(1.0, 0.0), vec2(3.0, 1.0)),
                    axis: 1,
                    children: [2, 4],
                },
                leaf(1.0, 3, 2),
                leaf(0.0, 0, 3),
                leaf(2.0, 5, 1),
            ],
            object_indices: vec![5, 0, 2, 1, 4, 3],
        };

        let (nodes, object_indices) = flatten(&build);
        assert_eq!(nodes.len(), 5);
        assert_eq!(object_indices, vec![5, 0, 2, 1, 4, 3]);

        assert_eq!(nodes[0].object_count, 0);
        assert_eq!(nodes[0].offset, 2);
        assert_eq!(nodes[0].aabb, bounds);

        assert_eq!(nodes[1].object_count, 3);
        assert_eq!(nodes[1].offset, 0);

        assert_eq!(nodes[2].object_count, 0);
        assert_eq!(nodes[2].axis, 1);
        assert_eq!(nodes[2].offset, 4);

        assert_eq!((nodes[3].offset, nodes[3].object_count), (3, 2));
        assert_eq!((nodes[4].offset, nodes[4].object_count), (5, 1));
    }

    #[test]
    fn test_flatten_single_leaf() {
        let build = BuildResult {
            nodes: vec![leaf(0.0, 0, 4)],
            object_indices: vec![3, 2, 1, 0],
        };
        let (nodes, object_indices) = flatten(&build);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].object_count, 4);
        assert_eq!(object_indices, vec![3, 2, 1, 0]);
    }
}
