use crate::behavior::bt::*;

/// Runs its children one after another, one child per tick.
pub struct BTSequence<T> {
    name: String,
    nodes: Vec<BoxedNode<T>>,
    index: usize,
}

impl<T> BTSequence<T> {
    pub fn new(name: &str, nodes: Vec<BoxedNode<T>>) -> BTSequence<T> {
        BTSequence {
            name: name.to_owned(),
            nodes,
            index: 0,
        }
    }
}

impl<T> BTNode<T> for BTSequence<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, blackboard: &mut Box<T>) -> BTResult {
        let len = self.nodes.len();

        if self.index < len {
            match self.nodes[self.index].tick(blackboard) {
                BTResult::Success => {
                    log::debug!("{}: {} done", self.name, self.nodes[self.index].name());
                    self.index += 1;
                    if self.index < len {
                        BTResult::Pending
                    } else {
                        BTResult::Success
                    }
                }
                BTResult::Pending => BTResult::Pending,
                BTResult::Failure => BTResult::Failure,
            }
        } else {
            BTResult::Failure
        }
    }
}
