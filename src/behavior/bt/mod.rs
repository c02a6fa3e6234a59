#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BTResult {
    Success,
    Failure,
    Pending,
}

pub type BoxedNode<T> = Box<dyn BTNode<T> + Send>;

pub struct BehaviorTree<T> {
    blackboard: Box<T>,
    root: BoxedNode<T>,
    status: BTResult,
}

impl<T> BehaviorTree<T> {
    pub fn new(root: BoxedNode<T>, blackboard: Box<T>) -> BehaviorTree<T> {
        BehaviorTree {
            blackboard,
            root,
            status: BTResult::Pending,
        }
    }

    /// Ticks the root once. A finished tree keeps its final status.
    pub fn tick(&mut self) -> BTResult {
        if self.status == BTResult::Pending {
            self.status = self.root.tick(&mut self.blackboard);
        }
        self.status
    }

    pub fn status(&self) -> BTResult {
        self.status
    }

    pub fn blackboard(&self) -> &T {
        &self.blackboard
    }

    pub fn blackboard_mut(&mut self) -> &mut T {
        &mut self.blackboard
    }
}

pub trait BTNode<T> {
    fn name(&self) -> &str;

    fn tick(&mut self, blackboard: &mut Box<T>) -> BTResult;
}

pub mod action;
pub mod sequence;

pub use action::BTAction;
pub use sequence::BTSequence;
