use common::StreamId;

/// Which stream, if any, is shown enlarged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Focus {
    #[default]
    Grid,
    Expanded(StreamId),
}

impl Focus {
    pub fn expanded(&self) -> Option<&StreamId> {
        match self {
            Self::Grid => None,
            Self::Expanded(id) => Some(id),
        }
    }

    pub fn is_expanded(&self, id: &StreamId) -> bool {
        self.expanded() == Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_focus() {
        let front = StreamId::new("NCBSC_front");
        assert_eq!(Focus::default(), Focus::Grid);
        assert!(Focus::Grid.expanded().is_none());

        let focus = Focus::Expanded(front.clone());
        assert!(focus.is_expanded(&front));
        assert!(!focus.is_expanded(&StreamId::new("TCBSC_back")));
    }
}
